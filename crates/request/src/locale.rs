//! Locale negotiation from the `Accept-Language` header.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid locale tag: {tag}")]
pub struct LocaleError {
    tag: String,
}

/// A language with optional country and variant, e.g. `en-US`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Locale {
    language: String,
    country: String,
    variant: String,
}

impl Locale {
    pub fn new(language: &str, country: &str) -> Self {
        Self { language: language.to_ascii_lowercase(), country: country.to_ascii_uppercase(), variant: String::new() }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Country code, empty when absent.
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Variant, empty when absent.
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// BCP 47 style tag, `en-US`.
    pub fn to_language_tag(&self) -> String {
        self.to_string()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("en", "US")
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.language)?;
        for part in [&self.country, &self.variant] {
            if !part.is_empty() {
                write!(f, "-{part}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Locale {
    type Err = LocaleError;

    /// Accepts both `en-US` and `en_US`.
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let invalid = || LocaleError { tag: tag.to_string() };

        let mut parts = tag.trim().split(['-', '_']);
        let language = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let country = parts.next().unwrap_or_default();
        let variant = parts.collect::<Vec<_>>().join("-");

        let well_formed = |s: &str| s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !language.chars().all(|c| c.is_ascii_alphabetic()) || !well_formed(country) || !well_formed(&variant) {
            return Err(invalid());
        }

        let mut locale = Locale::new(language, country);
        locale.variant = variant;
        Ok(locale)
    }
}

impl TryFrom<String> for Locale {
    type Error = LocaleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Preferred locales of a request, most preferred first.
///
/// The sequence is consumed as it is iterated; ask the request again to start over.
#[derive(Debug)]
pub struct Locales {
    inner: std::vec::IntoIter<Locale>,
}

impl Locales {
    pub(crate) fn new(locales: Vec<Locale>) -> Self {
        Self { inner: locales.into_iter() }
    }
}

impl Iterator for Locales {
    type Item = Locale;

    fn next(&mut self) -> Option<Locale> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Locales {}

/// Parses `Accept-Language` values into locales ordered by quality.
///
/// Entries with equal quality keep header order. `*`, `q=0` and malformed entries are dropped.
pub fn parse_accept_language<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Locale> {
    let mut weighted = values
        .into_iter()
        .flat_map(|value| value.split(','))
        .filter_map(|entry| {
            let mut params = entry.split(';');
            let tag = params.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }

            let quality = params
                .filter_map(|param| param.trim().strip_prefix("q="))
                .next()
                .map_or(Some(1000), parse_quality)?;
            if quality == 0 {
                return None;
            }

            tag.parse::<Locale>().ok().map(|locale| (quality, locale))
        })
        .collect::<Vec<_>>();

    // stable sort keeps header order between equal qualities
    weighted.sort_by(|(a, _), (b, _)| b.cmp(a));
    weighted.into_iter().map(|(_, locale)| locale).collect()
}

/// Quality in thousandths, `None` when it is not a number in `[0, 1]`.
fn parse_quality(value: &str) -> Option<u16> {
    let quality = value.trim().parse::<f32>().ok()?;
    if !(0.0..=1.0).contains(&quality) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "quality is within [0, 1]")]
    let thousandths = (quality * 1000.0).round() as u16;
    Some(thousandths)
}
