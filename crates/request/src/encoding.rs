//! Character encoding resolution for the request body.
//!
//! The charset used to decode the body is picked from, in priority order:
//!
//! 1. the explicit per-request override ([`EncodingResolver::set_encoding`])
//! 2. the `charset` parameter declared by the request's `Content-Type`
//! 3. the web application default
//! 4. the container-wide default
//! 5. [`FALLBACK_ENCODING`]
//!
//! Overrides must happen before the body is touched. Once the resolver is frozen
//! (body opened or parameters parsed) a late override is validated, logged and ignored.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::error::RequestError;

pub const FALLBACK_ENCODING: &str = "UTF-8";

/// A charset known to the decoding tables.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    encoding: &'static Encoding,
}

impl Charset {
    /// Looks up a charset by label, case-insensitively (`utf-8`, `ISO-8859-1`, `Shift_JIS`, ...).
    ///
    /// Labels follow the WHATWG Encoding Standard, so `ISO-8859-1` and `latin1` both
    /// resolve to `windows-1252`: bytes `0x80..=0x9F` decode to windows-1252 characters
    /// (`0x80` is `€`) rather than C1 controls, and [`Charset::name`] reports `windows-1252`.
    pub fn for_label(label: &str) -> Result<Self, RequestError> {
        Encoding::for_label_no_replacement(label.trim().as_bytes())
            .map(|encoding| Self { encoding })
            .ok_or_else(|| RequestError::unsupported_encoding(label))
    }

    pub fn utf_8() -> Self {
        Self { encoding: encoding_rs::UTF_8 }
    }

    /// Canonical name of the charset.
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    pub(crate) fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decodes a complete byte sequence, returning `None` on any invalid sequence.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        self.encoding.decode_without_bom_handling_and_without_replacement(bytes)
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncodingResolver {
    explicit: Option<(String, Charset)>,
    declared: Option<String>,
    context_default: Option<String>,
    container_default: Option<String>,
    frozen: bool,
}

impl EncodingResolver {
    pub fn new(context_default: Option<String>, container_default: Option<String>) -> Self {
        Self { explicit: None, declared: None, context_default, container_default, frozen: false }
    }

    /// Records the charset declared by the request itself, usually the `Content-Type` charset parameter.
    pub fn with_declared(mut self, declared: Option<String>) -> Self {
        self.declared = declared;
        self
    }

    /// Overrides the body encoding for this request.
    ///
    /// Fails if `name` is not a known charset. After the resolver is frozen the call
    /// still validates `name`, but the override is ignored.
    pub fn set_encoding(&mut self, name: &str) -> Result<(), RequestError> {
        let charset = Charset::for_label(name)?;
        self.apply(name.trim().to_string(), charset);
        Ok(())
    }

    /// Overrides the body encoding with an already validated charset.
    pub fn set_charset(&mut self, charset: Charset) {
        self.apply(charset.name().to_string(), charset);
    }

    fn apply(&mut self, name: String, charset: Charset) {
        if self.frozen {
            warn!(encoding = %name, "body access already started, ignoring character encoding override");
            return;
        }

        debug!(encoding = %name, "character encoding overridden");
        self.explicit = Some((name, charset));
    }

    /// Name of the encoding that applies to the body, `None` when only the fallback would apply.
    pub fn character_encoding(&self) -> Option<&str> {
        self.explicit
            .as_ref()
            .map(|(name, _)| name.as_str())
            .or(self.declared.as_deref())
            .or(self.context_default.as_deref())
            .or(self.container_default.as_deref())
    }

    /// Resolves the charset to decode the body with.
    pub fn resolve(&self) -> Result<Charset, RequestError> {
        if let Some((_, charset)) = &self.explicit {
            return Ok(*charset);
        }

        match self.character_encoding() {
            Some(name) => Charset::for_label(name),
            None => Charset::for_label(FALLBACK_ENCODING),
        }
    }

    /// Marks the start of body consumption, later overrides have no effect.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_lookup() {
        assert_eq!(Charset::for_label("utf-8").unwrap(), Charset::utf_8());
        assert_eq!(Charset::for_label(" UTF8 ").unwrap().name(), "UTF-8");
        assert_eq!(Charset::for_label("Shift_JIS").unwrap().name(), "Shift_JIS");

        let error = Charset::for_label("x-no-such-charset").unwrap_err();
        assert!(error.is_unsupported_encoding());

        // labels mapped to the replacement encoding can not decode anything
        assert!(Charset::for_label("iso-2022-kr").is_err());

        let latin1 = Charset::for_label("ISO-8859-1").unwrap();
        assert_eq!(latin1.name(), "windows-1252");
        assert_eq!(latin1.decode(b"\x80 caf\xE9").unwrap(), "€ café");
    }

    #[test]
    fn strict_decode() {
        let utf8 = Charset::utf_8();
        assert_eq!(utf8.decode("héllo".as_bytes()).as_deref(), Some("héllo"));
        assert_eq!(utf8.decode(&[0x66, 0xff, 0x6f]), None);

        let latin1 = Charset::for_label("iso-8859-1").unwrap();
        assert_eq!(latin1.decode(&[0x68, 0xe9]).as_deref(), Some("hé"));
    }

    #[test]
    fn container_default_without_overrides() {
        let resolver = EncodingResolver::new(None, Some("ISO-8859-1".into()));
        assert_eq!(resolver.character_encoding(), Some("ISO-8859-1"));
        assert_eq!(resolver.resolve().unwrap(), Charset::for_label("ISO-8859-1").unwrap());
    }

    #[test]
    fn priority_order() {
        let mut resolver = EncodingResolver::new(Some("windows-1251".into()), Some("ISO-8859-1".into()));
        assert_eq!(resolver.resolve().unwrap().name(), "windows-1251");

        resolver = resolver.with_declared(Some("Shift_JIS".into()));
        assert_eq!(resolver.resolve().unwrap().name(), "Shift_JIS");

        resolver.set_encoding("utf-16le").unwrap();
        assert_eq!(resolver.character_encoding(), Some("utf-16le"));
        assert_eq!(resolver.resolve().unwrap().name(), "UTF-16LE");
    }

    #[test]
    fn fallback_when_nothing_configured() {
        let resolver = EncodingResolver::default();
        assert_eq!(resolver.character_encoding(), None);
        assert_eq!(resolver.resolve().unwrap().name(), FALLBACK_ENCODING);
    }

    #[test]
    fn unknown_declared_charset_fails_on_resolve() {
        let resolver = EncodingResolver::default().with_declared(Some("bogus".into()));
        assert!(resolver.resolve().unwrap_err().is_unsupported_encoding());
    }

    #[test]
    fn override_after_freeze_is_ignored() {
        let mut resolver = EncodingResolver::default();
        resolver.freeze();

        resolver.set_encoding("ISO-8859-1").unwrap();
        assert_eq!(resolver.resolve().unwrap().name(), "UTF-8");

        // still validated
        assert!(resolver.set_encoding("nope").is_err());
    }
}
