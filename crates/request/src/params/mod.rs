//! Lazy, one-shot parameter parsing.
//!
//! Parameters come from three sources, merged into a single [`ParameterMap`]:
//!
//! - the query string, always decoded as UTF-8
//! - an `application/x-www-form-urlencoded` body, decoded with the resolved charset
//! - the field parts of a `multipart/form-data` body, when the endpoint is configured for it
//!
//! Query values come first; body values are appended after them under the same name.
//! Parsing runs at most once per request, on the first parameter access, and is the
//! point where the body gets consumed on the handler's behalf. A body the handler has
//! already opened, or whose content type the parser does not handle, is left alone and
//! stays fully readable.

mod map;
mod multipart;
mod urlencoded;

pub use map::ParameterMap;
pub use multipart::{FilePart, MultipartConfig, MultipartDecoder, Part};

#[cfg(test)]
pub(crate) use multipart::MockMultipartDecoder;

use std::fmt;
use std::sync::Arc;

use mime::Mime;
use tracing::{debug, warn};

use crate::body::{BodyAccessGuard, BodyAccessMode};
use crate::config::{EndpointConfig, FacadeConfig, ParameterFailurePolicy};
use crate::encoding::{Charset, EncodingResolver};
use crate::error::{ParameterError, RequestError};
use urlencoded::FormPairs;

/// How the body takes part in parameter parsing, decided once from the content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyKind {
    UrlEncoded,
    Multipart { boundary: Option<String> },
    Other,
}

impl BodyKind {
    pub(crate) fn classify(content_type: Option<&Mime>) -> Self {
        let Some(mime) = content_type else {
            return Self::Other;
        };

        if mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED {
            Self::UrlEncoded
        } else if mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA {
            Self::Multipart { boundary: mime.get_param(mime::BOUNDARY).map(|b| b.as_str().to_string()) }
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ParseState {
    NotStarted,
    InProgress,
    Done,
}

/// Everything the parser reads from the rest of the request.
pub(crate) struct ParseInput<'a> {
    pub(crate) query: Option<&'a str>,
    pub(crate) body_kind: &'a BodyKind,
    pub(crate) body: &'a mut BodyAccessGuard,
    pub(crate) encoding: &'a mut EncodingResolver,
    pub(crate) config: &'a FacadeConfig,
    pub(crate) endpoint: &'a EndpointConfig,
}

pub struct ParameterParser {
    state: ParseState,
    parameters: Arc<ParameterMap>,
    files: Vec<FilePart>,
}

impl ParameterParser {
    pub(crate) fn new() -> Self {
        Self { state: ParseState::NotStarted, parameters: Arc::new(ParameterMap::new()), files: Vec::new() }
    }

    /// Builds the parameter table unless it has been built already.
    ///
    /// A failure is reported to this call only; the table keeps whatever was parsed
    /// before the failure and later calls succeed with it.
    pub(crate) async fn ensure_parsed(&mut self, input: ParseInput<'_>) -> Result<(), RequestError> {
        match self.state {
            ParseState::Done => return Ok(()),
            ParseState::InProgress => {
                return Err(RequestError::illegal_state("parameter parsing was interrupted and can not be resumed"));
            }
            ParseState::NotStarted => {}
        }

        self.state = ParseState::InProgress;
        input.encoding.freeze();
        let mut table = TableBuilder::new(input.config.max_parameter_count(), input.config.failure_policy());
        let result = Self::parse(&mut table, &mut self.files, input).await;

        let parameters = table.finish();
        debug!(names = parameters.len(), values = parameters.value_count(), ok = result.is_ok(), "parameters parsed");
        self.parameters = Arc::new(parameters);
        self.state = ParseState::Done;
        result
    }

    async fn parse(
        table: &mut TableBuilder,
        files: &mut Vec<FilePart>,
        input: ParseInput<'_>,
    ) -> Result<(), RequestError> {
        let ParseInput { query, body_kind, body, encoding, config, endpoint } = input;

        if let Some(query) = query {
            table.accept_all(FormPairs::new(query.as_bytes(), Charset::utf_8(), "query string"))?;
        }

        let body_untouched = body.mode() == BodyAccessMode::Unopened;
        match body_kind {
            BodyKind::UrlEncoded if body_untouched => {
                let charset = encoding.resolve()?;
                let bytes = body.consume(Some(config.max_post_size())).await.map_err(ParameterError::from_body_read)?;
                table.accept_all(FormPairs::new(&bytes, charset, "request body"))?;
            }

            BodyKind::Multipart { boundary } if body_untouched => match endpoint.multipart_config() {
                Some((multipart, decoder)) => {
                    let boundary = boundary.as_deref().ok_or(ParameterError::MissingBoundary)?;
                    let charset = encoding.resolve()?;
                    let bytes = body.consume(multipart.max_request_size).await.map_err(ParameterError::from_body_read)?;
                    let parts = decoder.decode(boundary, bytes, charset)?;
                    let (fields, mut file_parts) = multipart::check_parts(parts, multipart)?;
                    table.accept_all(fields.into_iter().map(Ok))?;
                    files.append(&mut file_parts);
                }
                None => debug!("multipart is not configured for this endpoint, body left unread"),
            },

            BodyKind::UrlEncoded | BodyKind::Multipart { .. } => {
                debug!(mode = ?body.mode(), "body already opened by the handler, skipping body parameters");
            }

            BodyKind::Other => {}
        }

        Ok(())
    }

    /// The parsed table. Empty until parsing is done.
    pub fn parameters(&self) -> &Arc<ParameterMap> {
        &self.parameters
    }

    /// File parts of a multipart body. Empty until parsing is done.
    pub fn files(&self) -> &[FilePart] {
        &self.files
    }
}

impl fmt::Debug for ParameterParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterParser")
            .field("state", &self.state)
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

struct TableBuilder {
    parameters: ParameterMap,
    max_count: usize,
    policy: ParameterFailurePolicy,
}

impl TableBuilder {
    fn new(max_count: usize, policy: ParameterFailurePolicy) -> Self {
        Self { parameters: ParameterMap::new(), max_count, policy }
    }

    fn accept_all<I>(&mut self, pairs: I) -> Result<(), ParameterError>
    where
        I: IntoIterator<Item = Result<(String, String), ParameterError>>,
    {
        for pair in pairs {
            match pair {
                Ok((name, _)) if name.is_empty() => debug!("skipping parameter with empty name"),
                Ok((name, value)) => {
                    if self.parameters.value_count() >= self.max_count {
                        return Err(ParameterError::TooManyParameters { max_count: self.max_count });
                    }
                    self.parameters.append(name, value);
                }
                Err(e) if self.policy == ParameterFailurePolicy::Skip && e.is_recoverable() => {
                    warn!(cause = %e, "skipping undecodable parameter");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn finish(self) -> ParameterMap {
        self.parameters
    }
}
