//! The request object handed to handlers.
//!
//! [`RequestFacade`] ties the per-request parts together: header access, attributes,
//! the body encoding, guarded body access, lazy parameters and the async lifecycle.
//! It is owned by exactly one worker at a time; everything that mutates it takes
//! `&mut self`. The only piece meant to be shared with other tasks is the
//! [`AsyncContext`] returned by [`RequestFacade::start_async`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use http::header::ACCEPT_LANGUAGE;
use http::{HeaderMap, Method, Uri};
use mime::Mime;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::async_context::{AsyncContext, AsyncEvent, AsyncLifecycle, AsyncSpan, AsyncState};
use crate::attribute::{AttrValue, AttributeStore};
use crate::body::{BodyAccessGuard, BodyAccessMode, BodyReader, InputStream, RawBody};
use crate::config::{EndpointConfig, FacadeConfig};
use crate::connection::ConnectionInfo;
use crate::dispatch::{DispatcherType, RequestDispatcher};
use crate::encoding::{Charset, EncodingResolver};
use crate::error::RequestError;
use crate::header::{ContentLength, RequestHeader};
use crate::locale::{Locale, Locales, parse_accept_language};
use crate::params::{BodyKind, FilePart, ParameterMap, ParameterParser, ParseInput};

/// Identifier the protocol layer assigned to a request, such as an HTTP/2 stream id.
///
/// The container attaches it as a request extension before the facade is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRequestId(pub String);

pub struct RequestFacade {
    header: RequestHeader,
    content_type: Option<Mime>,
    attributes: AttributeStore,
    encoding: EncodingResolver,
    body: BodyAccessGuard,
    body_kind: BodyKind,
    parser: ParameterParser,
    config: Arc<FacadeConfig>,
    endpoint: EndpointConfig,
    connection: ConnectionInfo,
    request_id: u64,
    protocol_request_id: Option<String>,
    dispatcher_type: DispatcherType,
    async_lifecycle: AsyncLifecycle,
}

impl RequestFacade {
    pub(crate) fn new(
        header: RequestHeader,
        body: RawBody,
        config: Arc<FacadeConfig>,
        endpoint: EndpointConfig,
        connection: ConnectionInfo,
        request_id: u64,
        protocol_request_id: Option<String>,
    ) -> Self {
        let content_type = header.content_type();
        let encoding = EncodingResolver::new(
            config.context_encoding().map(ToOwned::to_owned),
            config.container_encoding().map(ToOwned::to_owned),
        )
        .with_declared(header.declared_charset());
        let body_kind = BodyKind::classify(content_type.as_ref());
        let async_lifecycle = AsyncLifecycle::new(endpoint.is_async_supported(), config.async_timeout());

        Self {
            header,
            content_type,
            attributes: AttributeStore::new(),
            encoding,
            body: BodyAccessGuard::new(body),
            body_kind,
            parser: ParameterParser::new(),
            config,
            endpoint,
            connection,
            request_id,
            protocol_request_id,
            dispatcher_type: DispatcherType::Request,
            async_lifecycle,
        }
    }

    // attributes

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// The attribute `name`, if it is set and holds a `T`.
    pub fn attribute_as<T: std::any::Any>(&self, name: &str) -> Option<&T> {
        self.attributes.get_as(name)
    }

    /// Sets the attribute `name`. Setting `None` removes it.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Option<AttrValue>) {
        self.attributes.set(name, value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<AttrValue> {
        self.attributes.remove(name)
    }

    /// A snapshot of the attribute names; later changes do not show up in it.
    pub fn attribute_names(&self) -> std::vec::IntoIter<String> {
        self.attributes.names()
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.attributes
    }

    /// Retires the request: attributes are released now rather than when the facade is dropped.
    pub fn recycle(&mut self) {
        debug!(request_id = self.request_id, attributes = self.attributes.len(), "request recycled");
        self.attributes.clear();
    }

    // encoding

    /// Name of the encoding the body is decoded with, `None` when only the fallback applies.
    pub fn character_encoding(&self) -> Option<&str> {
        self.encoding.character_encoding()
    }

    /// Overrides the body encoding.
    ///
    /// Fails with `UnsupportedEncoding` for an unknown name. Once the body or the
    /// parameters have been read, a valid name is accepted but has no effect.
    pub fn set_character_encoding(&mut self, name: &str) -> Result<(), RequestError> {
        self.encoding.set_encoding(name)
    }

    /// Overrides the body encoding with an already resolved charset.
    ///
    /// [`RequestFacade::character_encoding`] then reports the canonical [`Charset::name`].
    /// Ignored once the body or the parameters have been read.
    pub fn set_charset(&mut self, charset: Charset) {
        self.encoding.set_charset(charset);
    }

    // body

    /// Opens the body as raw bytes. Fails once the body has been opened as a reader.
    pub fn input_stream(&mut self) -> Result<InputStream, RequestError> {
        self.body.open_as_stream(&mut self.encoding)
    }

    /// Opens the body as text. Fails once the body has been opened as a stream.
    pub fn reader(&mut self) -> Result<BodyReader, RequestError> {
        self.body.open_as_reader(&mut self.encoding)
    }

    pub fn body_access_mode(&self) -> BodyAccessMode {
        self.body.mode()
    }

    // parameters

    /// Parses the parameters unless that happened already. Every parameter accessor calls this.
    ///
    /// Only the call that actually parses can fail with a parsing error; later calls see
    /// whatever was parsed before the failure.
    pub async fn ensure_parsed(&mut self) -> Result<(), RequestError> {
        let input = ParseInput {
            query: self.header.uri().query(),
            body_kind: &self.body_kind,
            body: &mut self.body,
            encoding: &mut self.encoding,
            config: &self.config,
            endpoint: &self.endpoint,
        };
        self.parser.ensure_parsed(input).await
    }

    /// First value of the parameter `name`.
    pub async fn parameter(&mut self, name: &str) -> Result<Option<&str>, RequestError> {
        self.ensure_parsed().await?;
        Ok(self.parser.parameters().get(name))
    }

    /// All values of the parameter `name`, query values first.
    pub async fn parameter_values(&mut self, name: &str) -> Result<Option<&[String]>, RequestError> {
        self.ensure_parsed().await?;
        Ok(self.parser.parameters().get_all(name))
    }

    pub async fn parameter_names(&mut self) -> Result<Vec<&str>, RequestError> {
        self.ensure_parsed().await?;
        Ok(self.parser.parameters().names().collect())
    }

    /// The whole parameter table. The table is immutable and can outlive the request.
    pub async fn parameter_map(&mut self) -> Result<Arc<ParameterMap>, RequestError> {
        self.ensure_parsed().await?;
        Ok(Arc::clone(self.parser.parameters()))
    }

    /// Deserializes the parameter table into `T`.
    pub async fn parameters_as<T: DeserializeOwned>(&mut self) -> Result<T, RequestError> {
        self.ensure_parsed().await?;
        self.parser.parameters().deserialize()
    }

    /// File parts of a `multipart/form-data` body.
    pub async fn parts(&mut self) -> Result<&[FilePart], RequestError> {
        self.ensure_parsed().await?;
        Ok(self.parser.files())
    }

    // request line and headers

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    pub fn protocol(&self) -> String {
        self.header.protocol()
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    pub fn content_length(&self) -> ContentLength {
        self.header.content_length()
    }

    // connection

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn scheme(&self) -> &str {
        self.header.uri().scheme_str().unwrap_or_else(|| self.connection.scheme())
    }

    pub fn is_secure(&self) -> bool {
        self.connection.is_secure()
    }

    /// Host name the client addressed, falling back to the local name of the connection.
    pub fn server_name(&self) -> Option<String> {
        match self.header.authority() {
            Some(authority) => Some(authority.host().to_string()),
            None => self.connection.local_name(),
        }
    }

    /// Port the client addressed.
    ///
    /// A `Host` header without a port means the default port of the scheme; without a
    /// `Host` header this is the local port of the connection.
    pub fn server_port(&self) -> Option<u16> {
        match self.header.authority() {
            Some(authority) => authority.port_u16().or_else(|| default_port(self.scheme())),
            None => self.local_port(),
        }
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.connection.remote_addr()
    }

    pub fn remote_host(&self) -> Option<String> {
        self.connection.remote_host()
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.connection.remote_addr().map(|addr| addr.port())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection.local_addr()
    }

    pub fn local_name(&self) -> Option<String> {
        self.connection.local_name()
    }

    pub fn local_port(&self) -> Option<u16> {
        self.connection.local_addr().map(|addr| addr.port())
    }

    /// Container unique id of this request.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn protocol_request_id(&self) -> Option<&str> {
        self.protocol_request_id.as_deref()
    }

    // locales

    /// The locale the client prefers most, or the configured default.
    pub fn locale(&self) -> Locale {
        self.locales().next().unwrap_or_else(|| self.config.default_locale().clone())
    }

    /// Locales from `Accept-Language` in decreasing preference, or just the configured default.
    pub fn locales(&self) -> Locales {
        let values = self.header.headers().get_all(ACCEPT_LANGUAGE).iter().filter_map(|value| value.to_str().ok());
        let mut locales = parse_accept_language(values);
        if locales.is_empty() {
            locales.push(self.config.default_locale().clone());
        }
        Locales::new(locales)
    }

    // dispatch

    pub fn dispatcher_type(&self) -> DispatcherType {
        self.dispatcher_type
    }

    /// Resolves `path` against the path of this request, for the container to forward or include.
    pub fn request_dispatcher(&self, path: &str) -> Option<RequestDispatcher> {
        RequestDispatcher::resolve(self.header.uri().path(), path)
    }

    // async

    pub fn is_async_supported(&self) -> bool {
        self.async_lifecycle.is_supported()
    }

    /// True while a started cycle has neither been dispatched nor completed.
    pub fn is_async_started(&self) -> bool {
        self.async_lifecycle.is_started()
    }

    pub fn async_state(&self) -> AsyncState {
        self.async_lifecycle.state()
    }

    /// Suspends the request with the original request and response.
    pub fn start_async(&mut self) -> Result<AsyncContext, RequestError> {
        self.start_cycle(AsyncEvent::default())
    }

    /// Suspends the request with a wrapped request and response.
    pub fn start_async_with(&mut self, request: AttrValue, response: AttrValue) -> Result<AsyncContext, RequestError> {
        self.start_cycle(AsyncEvent::wrapping(request, response))
    }

    fn start_cycle(&mut self, event: AsyncEvent) -> Result<AsyncContext, RequestError> {
        let path = self.header.uri().path().to_string();
        let context = self.async_lifecycle.start(event, &path)?;
        debug!(request_id = self.request_id, "request suspended");
        Ok(context)
    }

    /// The context of the current cycle, while started or dispatched.
    pub fn async_context(&self) -> Result<AsyncContext, RequestError> {
        self.async_lifecycle.context()
    }

    /// Takes the suspended part of the current cycle, for the container to await.
    pub fn take_async_span(&mut self) -> Result<AsyncSpan, RequestError> {
        self.async_lifecycle.take_span()
    }

    /// The container is about to run the target of a pending async dispatch.
    pub fn enter_async_dispatch(&mut self) -> Result<(), RequestError> {
        self.async_lifecycle.enter_dispatch()?;
        self.dispatcher_type = DispatcherType::Async;
        Ok(())
    }

    /// The target of an async dispatch returned; yields the state the request is left in.
    pub fn exit_async_dispatch(&mut self) -> AsyncState {
        self.async_lifecycle.exit_dispatch()
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

impl fmt::Debug for RequestFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestFacade")
            .field("request_id", &self.request_id)
            .field("method", self.header.method())
            .field("uri", self.header.uri())
            .field("body", &self.body)
            .field("parser", &self.parser)
            .field("async", &self.async_lifecycle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::RequestFactory;
    use crate::params::{MockMultipartDecoder, MultipartConfig, Part};
    use crate::AsyncListener;
    use bytes::Bytes;
    use http::Request;
    use http::header::{CONTENT_TYPE, HOST};
    use crate::error::ParameterError;
    use futures::stream;
    use http_body::Frame;
    use http_body_util::{Full, StreamBody};
    use serde::Deserialize;
    use std::io;
    use std::time::Duration;

    const FORM: &str = "application/x-www-form-urlencoded";

    fn facade(request: Request<&'static str>) -> RequestFacade {
        facade_with(FacadeConfig::default(), EndpointConfig::new(), request)
    }

    fn facade_with(config: FacadeConfig, endpoint: EndpointConfig, request: Request<&'static str>) -> RequestFacade {
        let request = request.map(|body| Full::new(Bytes::from_static(body.as_bytes())));
        RequestFactory::new(config).create(request, ConnectionInfo::default(), endpoint)
    }

    fn form(uri: &str, body: &'static str) -> Request<&'static str> {
        Request::post(uri).header(CONTENT_TYPE, FORM).body(body).unwrap()
    }

    #[tokio::test]
    async fn form_parameters() {
        let mut request = facade(form("/people", "name=O%27Brien&age=5"));

        assert_eq!(request.parameter("name").await.unwrap(), Some("O'Brien"));
        assert_eq!(request.parameter("age").await.unwrap(), Some("5"));
        assert_eq!(request.parameter("missing").await.unwrap(), None);
        assert_eq!(request.parameter_names().await.unwrap(), ["name", "age"]);
        assert_eq!(request.body_access_mode(), BodyAccessMode::Consumed);

        #[derive(Deserialize)]
        struct Person {
            name: String,
            age: u32,
        }
        let person: Person = request.parameters_as().await.unwrap();
        assert_eq!(person.name, "O'Brien");
        assert_eq!(person.age, 5);
    }

    #[tokio::test]
    async fn query_values_come_first() {
        let mut request = facade(form("/merge?a=1&a=2", "a=3"));
        let values = request.parameter_values("a").await.unwrap().unwrap();
        assert_eq!(values, ["1", "2", "3"]);

        let map = request.parameter_map().await.unwrap();
        assert_eq!(map.get("a"), Some("1"));
        assert_eq!(map.value_count(), 3);
    }

    #[tokio::test]
    async fn body_consumed_at_most_once() {
        let mut request = facade(form("/", "a=1"));
        request.ensure_parsed().await.unwrap();
        request.ensure_parsed().await.unwrap();

        let stream = request.input_stream().unwrap();
        assert_eq!(stream.read_to_end().await.unwrap(), Bytes::new());
        assert_eq!(request.parameter("a").await.unwrap(), Some("1"));
    }

    #[tokio::test]
    async fn stream_then_reader() {
        let mut request = facade(Request::post("/").body("raw body").unwrap());
        let stream = request.input_stream().unwrap();

        let err = request.reader().unwrap_err();
        assert!(err.is_illegal_state());

        assert_eq!(stream.read_to_end().await.unwrap(), Bytes::from_static(b"raw body"));
        assert_eq!(request.body_access_mode(), BodyAccessMode::AsStream);
    }

    #[tokio::test]
    async fn reader_then_stream() {
        let mut request = facade(Request::post("/").body("line one\r\nline two").unwrap());
        let reader = request.reader().unwrap();
        assert!(request.input_stream().unwrap_err().is_illegal_state());

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("line one"));
        let again = request.reader().unwrap();
        assert_eq!(again.read_line().await.unwrap().as_deref(), Some("line two"));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn opened_form_body_is_not_parsed() {
        let mut request = facade(form("/?q=1", "a=1"));
        let stream = request.input_stream().unwrap();

        assert_eq!(request.parameter_names().await.unwrap(), ["q"]);
        assert_eq!(stream.read_to_end().await.unwrap(), Bytes::from_static(b"a=1"));
    }

    #[tokio::test]
    async fn body_of_other_type_stays_readable() {
        let request = Request::post("/?id=7").header(CONTENT_TYPE, "application/json").body(r#"{"id":7}"#).unwrap();
        let mut request = facade(request);

        assert_eq!(request.parameter("id").await.unwrap(), Some("7"));
        let reader = request.reader().unwrap();
        assert_eq!(reader.read_to_string().await.unwrap(), r#"{"id":7}"#);
    }

    #[tokio::test]
    async fn encoding_priority() {
        let config = FacadeConfig::builder().container_encoding("ISO-8859-1").build();
        let request = facade_with(config.clone(), EndpointConfig::new(), form("/", ""));
        assert_eq!(request.character_encoding(), Some("ISO-8859-1"));

        let request = Request::post("/").header(CONTENT_TYPE, "text/plain; charset=UTF-16LE").body("").unwrap();
        let request = facade_with(config, EndpointConfig::new(), request);
        assert_eq!(request.character_encoding(), Some("UTF-16LE"));

        let request = facade(form("/", ""));
        assert_eq!(request.character_encoding(), None);
    }

    #[tokio::test]
    async fn explicit_encoding_decodes_form() {
        // "café" in ISO-8859-1
        let mut request = facade(form("/", "name=caf%E9"));
        assert!(request.set_character_encoding("no-such-charset").unwrap_err().is_unsupported_encoding());
        request.set_character_encoding("ISO-8859-1").unwrap();
        assert_eq!(request.parameter("name").await.unwrap(), Some("café"));
    }

    #[tokio::test]
    async fn charset_override_decodes_form() {
        let mut request = facade(form("/", "name=caf%E9"));
        request.set_charset(Charset::for_label("ISO-8859-1").unwrap());
        assert_eq!(request.character_encoding(), Some("windows-1252"));
        assert_eq!(request.parameter("name").await.unwrap(), Some("café"));

        request.set_charset(Charset::utf_8());
        assert_eq!(request.character_encoding(), Some("windows-1252"));
    }

    #[tokio::test]
    async fn failed_query_still_freezes_encoding() {
        let mut request = facade(form("/?x=%zz", "name=caf%E9"));
        assert!(request.parameter("name").await.unwrap_err().is_illegal_state());

        request.set_character_encoding("ISO-8859-1").unwrap();
        assert_eq!(request.character_encoding(), None);
        assert_eq!(request.parameter("name").await.unwrap(), None);
    }

    #[tokio::test]
    async fn broken_body_fails_parameters() {
        let frames: Vec<Result<Frame<Bytes>, io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"a=1&"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
        ];
        let body = StreamBody::new(stream::iter(frames));
        let request = Request::post("/?q=1").header(CONTENT_TYPE, FORM).body(body).unwrap();
        let mut request = RequestFactory::default().create(request, ConnectionInfo::default(), EndpointConfig::new());

        let err = request.parameter("a").await.unwrap_err();
        assert!(err.is_illegal_state());
        assert!(matches!(err, RequestError::InvalidParameters { source: ParameterError::Io { .. } }));

        assert_eq!(request.parameter("q").await.unwrap(), Some("1"));
        assert_eq!(request.parameter("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn late_encoding_override_is_ignored() {
        let mut request = facade(form("/", "name=caf%C3%A9"));
        assert_eq!(request.parameter("name").await.unwrap(), Some("café"));

        request.set_character_encoding("ISO-8859-1").unwrap();
        assert_eq!(request.character_encoding(), None);
        assert!(request.set_character_encoding("bogus").is_err());
    }

    #[tokio::test]
    async fn failed_parse_is_reported_once() {
        let mut request = facade(form("/?ok=1", "bad=%zz"));
        let err = request.parameter("ok").await.unwrap_err();
        assert!(err.is_illegal_state());

        assert_eq!(request.parameter("ok").await.unwrap(), Some("1"));
        assert_eq!(request.parameter("bad").await.unwrap(), None);
    }

    #[tokio::test]
    async fn multipart_fields_and_files() {
        let mut decoder = MockMultipartDecoder::new();
        decoder.expect_decode().times(1).returning(|boundary, body, _charset| {
            assert_eq!(boundary, "xyz");
            assert_eq!(body, Bytes::from_static(b"--xyz..."));
            Ok(vec![
                Part::Field { name: "title".into(), value: "holiday".into() },
                Part::File(FilePart {
                    name: "photo".into(),
                    file_name: Some("beach.jpg".into()),
                    content_type: Some("image/jpeg".into()),
                    data: Bytes::from_static(b"\xff\xd8"),
                }),
            ])
        });

        let endpoint = EndpointConfig::new().multipart(MultipartConfig::default(), Arc::new(decoder));
        let request = Request::post("/upload?album=2024")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=xyz")
            .body("--xyz...")
            .unwrap();
        let mut request = facade_with(FacadeConfig::default(), endpoint, request);

        assert_eq!(request.parameter_names().await.unwrap(), ["album", "title"]);
        let files = request.parts().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name.as_deref(), Some("beach.jpg"));
    }

    #[test]
    fn passthrough_accessors() {
        let request = Request::get("/index.html")
            .header(HOST, "shop.example.com")
            .header(ACCEPT_LANGUAGE, "da, en-GB;q=0.8, en;q=0.7")
            .body("")
            .unwrap();
        let connection = ConnectionInfo::builder()
            .local_addr("10.0.0.1:8443".parse().unwrap())
            .remote_addr("192.168.1.20:53211".parse().unwrap())
            .secure(true)
            .build();
        let request = request.map(|body| Full::new(Bytes::from_static(body.as_bytes())));
        let request = RequestFactory::new(FacadeConfig::default()).create(request, connection, EndpointConfig::new());

        assert_eq!(request.protocol(), "HTTP/1.1");
        assert_eq!(request.scheme(), "https");
        assert!(request.is_secure());
        assert_eq!(request.server_name().as_deref(), Some("shop.example.com"));
        assert_eq!(request.server_port(), Some(443));
        assert_eq!(request.local_port(), Some(8443));
        assert_eq!(request.remote_port(), Some(53211));
        assert_eq!(request.remote_host().as_deref(), Some("192.168.1.20"));
        assert_eq!(request.content_type(), None);
        assert_eq!(request.content_length(), ContentLength::Unknown);
        assert_eq!(request.protocol_request_id(), None);
        assert_eq!(request.dispatcher_type(), DispatcherType::Request);

        assert_eq!(request.locale(), Locale::new("da", ""));
        let tags: Vec<_> = request.locales().map(|l| l.to_language_tag()).collect();
        assert_eq!(tags, ["da", "en-GB", "en"]);

        assert_eq!(request.request_dispatcher("help.html").unwrap().path(), "/help.html");
        assert!(request.request_dispatcher("").is_none());
    }

    #[test]
    fn server_falls_back_to_connection() {
        let connection = ConnectionInfo::builder().local_addr("127.0.0.1:8080".parse().unwrap()).build();
        let request = Request::get("/").body(Full::new(Bytes::new())).unwrap();
        let request = RequestFactory::new(FacadeConfig::default()).create(request, connection, EndpointConfig::new());

        assert_eq!(request.server_name().as_deref(), Some("127.0.0.1"));
        assert_eq!(request.server_port(), Some(8080));
        assert_eq!(request.scheme(), "http");
    }

    #[test]
    fn default_locale_without_header() {
        let config = FacadeConfig::builder().default_locale(Locale::new("fr", "FR")).build();
        let request = facade_with(config, EndpointConfig::new(), Request::get("/").body("").unwrap());

        let locales = request.locales();
        assert_eq!(locales.len(), 1);
        assert_eq!(request.locale(), Locale::new("fr", "FR"));
    }

    #[test]
    fn attributes() {
        let mut request = facade(Request::get("/").body("").unwrap());
        request.set_attribute("user", Some(Arc::new("alice".to_string())));
        request.attributes_mut().insert("visits", 3_u32);

        assert_eq!(request.attribute_as::<String>("user").map(String::as_str), Some("alice"));
        assert_eq!(request.attribute_names().collect::<Vec<_>>(), ["user", "visits"]);

        request.set_attribute("user", None);
        assert!(request.attribute("user").is_none());
        assert!(request.remove_attribute("visits").is_some());
        assert_eq!(request.attribute_names().len(), 0);

        request.set_attribute("token", Some(Arc::new(7_u8)));
        request.recycle();
        assert!(request.attribute("token").is_none());
    }

    #[test]
    fn async_not_supported() {
        let mut request = facade(Request::get("/").body("").unwrap());
        assert!(!request.is_async_supported());
        assert!(request.start_async().unwrap_err().is_illegal_state());
        assert!(request.async_context().is_err());
    }

    #[tokio::test]
    async fn async_start_and_complete() {
        let endpoint = EndpointConfig::new().async_supported(true);
        let mut request = facade_with(FacadeConfig::default(), endpoint, Request::get("/report").body("").unwrap());

        assert!(!request.is_async_started());
        let context = request.start_async().unwrap();
        assert!(request.is_async_started());
        assert!(request.start_async().unwrap_err().is_illegal_state());

        let span = request.take_async_span().unwrap();
        tokio::spawn(async move { context.complete().unwrap() }).await.unwrap();

        assert_eq!(span.resume().await, crate::Resumption::Complete);
        assert!(!request.is_async_started());
        assert_eq!(request.async_state(), AsyncState::Completed);
    }

    #[tokio::test]
    async fn async_dispatch_round_trip() {
        struct Marker;
        impl AsyncListener for Marker {}

        let endpoint = EndpointConfig::new().async_supported(true);
        let mut request = facade_with(FacadeConfig::default(), endpoint, Request::get("/jobs/run").body("").unwrap());

        let context = request.start_async_with(Arc::new("wrapped request"), Arc::new("wrapped response")).unwrap();
        assert!(!context.has_original_request_and_response());
        context.add_listener(Arc::new(Marker)).unwrap();
        context.dispatch_to("status").unwrap();

        let resumption = request.take_async_span().unwrap().resume().await;
        let crate::Resumption::Dispatch(target) = resumption else {
            panic!("expected a dispatch, got {resumption:?}");
        };
        assert_eq!(target.path(), "/jobs/status");

        request.enter_async_dispatch().unwrap();
        assert_eq!(request.dispatcher_type(), DispatcherType::Async);
        assert_eq!(request.exit_async_dispatch(), AsyncState::Sync);
        assert!(!request.is_async_started());
    }

    #[tokio::test(start_paused = true)]
    async fn async_timeout_from_config() {
        let config = FacadeConfig::builder().async_timeout(Duration::from_millis(250)).build();
        let endpoint = EndpointConfig::new().async_supported(true);
        let mut request = facade_with(config, endpoint, Request::get("/slow").body("").unwrap());

        let context = request.start_async().unwrap();
        assert_eq!(context.timeout(), Duration::from_millis(250));

        let resumption = request.take_async_span().unwrap().resume().await;
        assert_eq!(resumption, crate::Resumption::TimedOut);
        assert!(context.complete().unwrap_err().is_illegal_state());
    }

    #[test]
    fn debug_output() {
        let request = facade(Request::get("/dbg").body("").unwrap());
        let debug = format!("{request:?}");
        assert!(debug.contains("/dbg"), "{debug}");
    }
}
