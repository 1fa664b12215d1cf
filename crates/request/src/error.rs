use std::error::Error;
use std::io;
use thiserror::Error;

/// Boxed error produced by the transport body.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    #[error("unsupported encoding: {name}")]
    UnsupportedEncoding { name: String },

    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("invalid parameters: {source}")]
    InvalidParameters {
        #[from]
        source: ParameterError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("body error: {source}")]
    Body { source: BoxError },

    #[error("deserialize parameters error: {reason}")]
    Deserialize { reason: String },
}

impl RequestError {
    pub fn illegal_state<S: ToString>(str: S) -> Self {
        Self::IllegalState { reason: str.to_string() }
    }

    pub fn unsupported_encoding<S: ToString>(name: S) -> Self {
        Self::UnsupportedEncoding { name: name.to_string() }
    }

    pub fn malformed_input<S: ToString>(str: S) -> Self {
        Self::MalformedInput { reason: str.to_string() }
    }

    pub fn deserialize<E: ToString>(e: E) -> Self {
        Self::Deserialize { reason: e.to_string() }
    }

    /// Wraps a transport body failure, unwrapping it to [`RequestError::Io`] when the
    /// transport reported an `io::Error`.
    pub fn body(e: BoxError) -> Self {
        match e.downcast::<io::Error>() {
            Ok(io_error) => Self::Io { source: *io_error },
            Err(other) => Self::Body { source: other },
        }
    }

    /// Sequencing errors and parameter parse failures both belong to the illegal-state class.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. } | Self::InvalidParameters { .. })
    }

    pub fn is_unsupported_encoding(&self) -> bool {
        matches!(self, Self::UnsupportedEncoding { .. })
    }
}

/// Failures raised while building the parameter table.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("malformed percent-encoding in {source_name}: {reason}")]
    MalformedEncoding { source_name: &'static str, reason: String },

    #[error("parameter bytes are not valid {charset}")]
    UndecodableBytes { charset: &'static str },

    #[error("parameter count exceed the limit {max_count}")]
    TooManyParameters { max_count: usize },

    #[error("request body size exceed the limit {max_size}")]
    BodyTooLarge { max_size: u64 },

    #[error("multipart part count exceed the limit {max_count}")]
    TooManyParts { max_count: usize },

    #[error("multipart file part '{name}' size {size} exceed the limit {max_size}")]
    FileTooLarge { name: String, size: u64, max_size: u64 },

    #[error("multipart content type has no boundary")]
    MissingBoundary,

    #[error("multipart decode error: {reason}")]
    Multipart { reason: String },

    #[error("io error while reading request body: {source}")]
    Io { source: io::Error },
}

impl ParameterError {
    pub fn malformed_encoding<S: ToString>(source_name: &'static str, reason: S) -> Self {
        Self::MalformedEncoding { source_name, reason: reason.to_string() }
    }

    pub fn multipart<S: ToString>(reason: S) -> Self {
        Self::Multipart { reason: reason.to_string() }
    }

    /// Folds a transport failure met while draining the body for parameters.
    pub fn from_body_read(e: RequestError) -> RequestError {
        match e {
            RequestError::Io { source } => Self::Io { source }.into(),
            RequestError::Body { source } => Self::Io { source: io::Error::other(source) }.into(),
            other => other,
        }
    }

    /// Decoding failures may be skipped under a lenient policy, limits may not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedEncoding { .. } | Self::UndecodableBytes { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_error_unwraps_io() {
        let boxed: BoxError = Box::new(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let error = RequestError::body(boxed);
        assert!(matches!(error, RequestError::Io { ref source } if source.kind() == io::ErrorKind::ConnectionReset));
    }

    #[test]
    fn body_read_failures_become_parameter_errors() {
        let reset = RequestError::Io { source: io::Error::new(io::ErrorKind::ConnectionReset, "reset") };
        let error = ParameterError::from_body_read(reset);
        assert!(error.is_illegal_state());
        assert!(matches!(
            error,
            RequestError::InvalidParameters { source: ParameterError::Io { ref source } }
                if source.kind() == io::ErrorKind::ConnectionReset
        ));

        let boxed: BoxError = "stream aborted".into();
        let error = ParameterError::from_body_read(RequestError::Body { source: boxed });
        assert!(matches!(error, RequestError::InvalidParameters { source: ParameterError::Io { .. } }));

        let limit = RequestError::from(ParameterError::BodyTooLarge { max_size: 1 });
        assert!(matches!(
            ParameterError::from_body_read(limit),
            RequestError::InvalidParameters { source: ParameterError::BodyTooLarge { max_size: 1 } }
        ));
    }

    #[test]
    fn parameter_failures_are_illegal_state() {
        let error = RequestError::from(ParameterError::TooManyParameters { max_count: 3 });
        assert!(error.is_illegal_state());
        assert_eq!(error.to_string(), "invalid parameters: parameter count exceed the limit 3");

        assert!(!RequestError::unsupported_encoding("x-unknown").is_illegal_state());
    }
}
