//! Container, web application and endpoint configuration.
//!
//! A [`FacadeConfig`] snapshot is handed to each request when it is created; nothing
//! is read from global state afterwards.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::locale::Locale;
use crate::params::{MultipartConfig, MultipartDecoder};

pub const DEFAULT_MAX_PARAMETER_COUNT: usize = 10_000;
pub const DEFAULT_MAX_POST_SIZE: u64 = 2 * 1024 * 1024;
pub const DEFAULT_ASYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do with a parameter that can not be decoded.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterFailurePolicy {
    /// Fail the access that triggered parsing.
    #[default]
    Fail,
    /// Drop the offending parameter and keep going. Limits still fail.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    container_encoding: Option<String>,
    context_encoding: Option<String>,
    default_locale: Locale,
    max_parameter_count: usize,
    max_post_size: u64,
    #[serde(rename = "async_timeout_ms", deserialize_with = "duration_from_millis")]
    async_timeout: Duration,
    failure_policy: ParameterFailurePolicy,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            container_encoding: None,
            context_encoding: None,
            default_locale: Locale::default(),
            max_parameter_count: DEFAULT_MAX_PARAMETER_COUNT,
            max_post_size: DEFAULT_MAX_POST_SIZE,
            async_timeout: DEFAULT_ASYNC_TIMEOUT,
            failure_policy: ParameterFailurePolicy::default(),
        }
    }
}

impl FacadeConfig {
    pub fn builder() -> FacadeConfigBuilder {
        FacadeConfigBuilder { config: FacadeConfig::default() }
    }

    /// Body encoding used when neither the request nor the web application names one.
    pub fn container_encoding(&self) -> Option<&str> {
        self.container_encoding.as_deref()
    }

    /// Body encoding configured by the web application.
    pub fn context_encoding(&self) -> Option<&str> {
        self.context_encoding.as_deref()
    }

    pub fn default_locale(&self) -> &Locale {
        &self.default_locale
    }

    pub fn max_parameter_count(&self) -> usize {
        self.max_parameter_count
    }

    pub fn max_post_size(&self) -> u64 {
        self.max_post_size
    }

    pub fn async_timeout(&self) -> Duration {
        self.async_timeout
    }

    pub fn failure_policy(&self) -> ParameterFailurePolicy {
        self.failure_policy
    }
}

#[derive(Debug)]
pub struct FacadeConfigBuilder {
    config: FacadeConfig,
}

impl FacadeConfigBuilder {
    pub fn container_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.container_encoding = Some(encoding.into());
        self
    }

    pub fn context_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.context_encoding = Some(encoding.into());
        self
    }

    pub fn default_locale(mut self, locale: Locale) -> Self {
        self.config.default_locale = locale;
        self
    }

    pub fn max_parameter_count(mut self, count: usize) -> Self {
        self.config.max_parameter_count = count;
        self
    }

    pub fn max_post_size(mut self, size: u64) -> Self {
        self.config.max_post_size = size;
        self
    }

    pub fn async_timeout(mut self, timeout: Duration) -> Self {
        self.config.async_timeout = timeout;
        self
    }

    pub fn failure_policy(mut self, policy: ParameterFailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn build(self) -> FacadeConfig {
        self.config
    }
}

fn duration_from_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Per-endpoint settings, supplied by the container's dispatch component.
#[derive(Clone, Default)]
pub struct EndpointConfig {
    async_supported: bool,
    multipart: Option<(MultipartConfig, Arc<dyn MultipartDecoder>)>,
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn async_supported(mut self, supported: bool) -> Self {
        self.async_supported = supported;
        self
    }

    /// Enables multipart parameter parsing for this endpoint.
    pub fn multipart(mut self, config: MultipartConfig, decoder: Arc<dyn MultipartDecoder>) -> Self {
        self.multipart = Some((config, decoder));
        self
    }

    pub fn is_async_supported(&self) -> bool {
        self.async_supported
    }

    pub(crate) fn multipart_config(&self) -> Option<(&MultipartConfig, &dyn MultipartDecoder)> {
        self.multipart.as_ref().map(|(config, decoder)| (config, decoder.as_ref()))
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("async_supported", &self.async_supported)
            .field("multipart", &self.multipart.as_ref().map(|(config, _)| config))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn defaults() {
        let config = FacadeConfig::default();
        assert_eq!(config.container_encoding(), None);
        assert_eq!(config.max_parameter_count(), 10_000);
        assert_eq!(config.async_timeout(), Duration::from_secs(30));
        assert_eq!(config.failure_policy(), ParameterFailurePolicy::Fail);
        assert_eq!(config.default_locale().to_string(), "en-US");
    }

    #[test]
    fn deserialize_partial() {
        let json = indoc! {r#"
        {
            "container_encoding": "ISO-8859-1",
            "default_locale": "fr_FR",
            "async_timeout_ms": 1500,
            "failure_policy": "skip"
        }
        "#};

        let config: FacadeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.container_encoding(), Some("ISO-8859-1"));
        assert_eq!(config.context_encoding(), None);
        assert_eq!(config.default_locale(), &Locale::new("fr", "FR"));
        assert_eq!(config.async_timeout(), Duration::from_millis(1500));
        assert_eq!(config.failure_policy(), ParameterFailurePolicy::Skip);
        assert_eq!(config.max_post_size(), DEFAULT_MAX_POST_SIZE);
    }

    #[test]
    fn builder() {
        let config = FacadeConfig::builder().context_encoding("UTF-16LE").max_post_size(10).build();
        assert_eq!(config.context_encoding(), Some("UTF-16LE"));
        assert_eq!(config.max_post_size(), 10);
    }

    #[test]
    fn multipart_config_deserialize() {
        let config: MultipartConfig = serde_json::from_str(r#"{"max_part_count": 4}"#).unwrap();
        assert_eq!(config, MultipartConfig { max_part_count: Some(4), ..MultipartConfig::default() });
    }
}
