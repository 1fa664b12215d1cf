//! Creation of request facades.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::Request;
use http_body::Body;
use tracing::{debug, info};

use crate::body::box_body;
use crate::config::{EndpointConfig, FacadeConfig};
use crate::connection::ConnectionInfo;
use crate::error::BoxError;
use crate::facade::{ProtocolRequestId, RequestFacade};

/// Builds a [`RequestFacade`] for every request the container accepts.
///
/// The factory holds the live configuration. [`RequestFactory::reload`] swaps it without
/// blocking; requests already created keep the snapshot they were created with.
#[derive(Debug)]
pub struct RequestFactory {
    config: ArcSwap<FacadeConfig>,
    next_id: AtomicU64,
}

impl RequestFactory {
    pub fn new(config: FacadeConfig) -> Self {
        Self { config: ArcSwap::from_pointee(config), next_id: AtomicU64::new(1) }
    }

    /// The configuration new requests are created with.
    pub fn config(&self) -> Arc<FacadeConfig> {
        self.config.load_full()
    }

    pub fn reload(&self, config: FacadeConfig) {
        info!(?config, "request configuration reloaded");
        self.config.store(Arc::new(config));
    }

    pub fn create<B>(&self, request: Request<B>, connection: ConnectionInfo, endpoint: EndpointConfig) -> RequestFacade
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = request.into_parts();
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let protocol_request_id = parts.extensions.remove::<ProtocolRequestId>().map(|id| id.0);

        debug!(request_id, method = %parts.method, uri = %parts.uri, "request created");
        RequestFacade::new(
            parts.into(),
            box_body(body),
            self.config(),
            endpoint,
            connection,
            request_id,
            protocol_request_id,
        )
    }
}

impl Default for RequestFactory {
    fn default() -> Self {
        Self::new(FacadeConfig::default())
    }
}
