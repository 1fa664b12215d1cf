use std::net::SocketAddr;

/// Connection metadata captured from the transport when the request is created.
///
/// Read-only for the lifetime of the request. Unknown values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    connection_id: String,
    protocol_connection_id: String,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    local_name: Option<String>,
    remote_host: Option<String>,
    scheme: Option<String>,
    secure: bool,
}

impl ConnectionInfo {
    pub fn builder() -> ConnectionInfoBuilder {
        ConnectionInfoBuilder { info: ConnectionInfo::default() }
    }

    /// Container-assigned identifier of the network connection.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Identifier assigned by the protocol, empty when the protocol has none (HTTP/1.x).
    pub fn protocol_connection_id(&self) -> &str {
        &self.protocol_connection_id
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Host name of the local interface, falling back to its IP address.
    pub fn local_name(&self) -> Option<String> {
        self.local_name.clone().or_else(|| self.local_addr.map(|addr| addr.ip().to_string()))
    }

    /// Host name of the client, falling back to its IP address when it was not resolved.
    pub fn remote_host(&self) -> Option<String> {
        self.remote_host.clone().or_else(|| self.remote_addr.map(|addr| addr.ip().to_string()))
    }

    /// `https` for secure connections unless the transport said otherwise.
    pub fn scheme(&self) -> &str {
        match &self.scheme {
            Some(scheme) => scheme,
            None if self.secure => "https",
            None => "http",
        }
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

#[derive(Debug)]
pub struct ConnectionInfoBuilder {
    info: ConnectionInfo,
}

impl ConnectionInfoBuilder {
    pub fn connection_id(mut self, id: impl Into<String>) -> Self {
        self.info.connection_id = id.into();
        self
    }

    pub fn protocol_connection_id(mut self, id: impl Into<String>) -> Self {
        self.info.protocol_connection_id = id.into();
        self
    }

    pub fn local_addr(mut self, addr: SocketAddr) -> Self {
        self.info.local_addr = Some(addr);
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.info.remote_addr = Some(addr);
        self
    }

    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        self.info.local_name = Some(name.into());
        self
    }

    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.info.remote_host = Some(host.into());
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.info.scheme = Some(scheme.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.info.secure = secure;
        self
    }

    pub fn build(self) -> ConnectionInfo {
        self.info
    }
}
