//! A request facade for an asynchronous HTTP container
//!
//! This crate provides the request object a container hands to its handlers. It sits on
//! top of an `http::Request` whose body is still streaming from the client, and adds the
//! per-request services handlers expect from a servlet style API:
//!
//! - Named attributes shared along the processing chain
//! - Character encoding resolution for the body
//! - Guarded body access, as raw bytes or as decoded text but never both
//! - Lazy, one-shot parameter parsing from the query string and form bodies
//! - Asynchronous processing: suspend a request, then dispatch or complete it from another task
//! - Connection, locale and dispatch metadata
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::Request;
//! use http_body_util::Full;
//! use micro_request::{ConnectionInfo, EndpointConfig, FacadeConfig, RequestFactory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), micro_request::RequestError> {
//!     let factory = RequestFactory::new(FacadeConfig::default());
//!
//!     let request = Request::post("/people?source=web")
//!         .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
//!         .body(Full::new(Bytes::from_static(b"name=O%27Brien&age=5")))
//!         .unwrap();
//!
//!     let mut request = factory.create(request, ConnectionInfo::default(), EndpointConfig::new());
//!
//!     assert_eq!(request.parameter("name").await?, Some("O'Brien"));
//!     assert_eq!(request.parameter_names().await?, ["source", "name", "age"]);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`factory`]: creates one [`RequestFacade`] per request from the live configuration
//! - [`facade`]: the request object, composing the components below
//! - [`attribute`]: the attribute store
//! - [`encoding`]: charset validation and resolution
//! - [`body`]: exclusive stream or reader access to the body
//! - [`params`]: the lazy parameter parser and the multipart seam
//! - [`async_context`]: the async lifecycle and the handoff back to the container
//! - [`config`], [`connection`], [`dispatch`], [`header`], [`locale`]: configuration and metadata
//!
//! # Ownership
//!
//! A [`RequestFacade`] is owned by one worker at a time and every mutating operation takes
//! `&mut self`. Operations that read the body are `async` and resolve once the transport
//! delivered enough data. The [`AsyncContext`] is the only handle meant to be shared with
//! other tasks; the container awaits the [`AsyncSpan`] of a suspended request to learn
//! when and how to resume it.
//!
//! # Error Handling
//!
//! - [`RequestError`]: returned by every fallible operation
//! - [`ParameterError`]: why parameter parsing failed, wrapped in [`RequestError::InvalidParameters`]

pub mod async_context;
pub mod attribute;
pub mod body;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod facade;
pub mod factory;
pub mod header;
pub mod locale;
pub mod params;

mod utils;
pub(crate) use utils::ensure;

pub use async_context::{AsyncContext, AsyncEvent, AsyncListener, AsyncSpan, AsyncState, Resumption};
pub use attribute::{AttrValue, AttributeStore};
pub use body::{BodyAccessMode, BodyReader, InputStream};
pub use config::{EndpointConfig, FacadeConfig, FacadeConfigBuilder, ParameterFailurePolicy};
pub use connection::{ConnectionInfo, ConnectionInfoBuilder};
pub use dispatch::{DispatcherType, RequestDispatcher};
pub use encoding::Charset;
pub use error::{BoxError, ParameterError, RequestError};
pub use facade::{ProtocolRequestId, RequestFacade};
pub use factory::RequestFactory;
pub use header::ContentLength;
pub use locale::{Locale, Locales};
pub use params::{FilePart, MultipartConfig, MultipartDecoder, ParameterMap, Part};
