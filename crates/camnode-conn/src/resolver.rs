//! Canonical service endpoint derivation.
//!
//! The appliance publishes two endpoints: the HTTP control UI and the
//! WebSocket stream. Both are derived from the current host and port, and
//! must be recomputed whenever either changes.

/// Port elided from derived URLs.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Path suffix of the streaming endpoint.
pub const STREAM_PATH: &str = "/ws";

/// The resolved endpoint set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    /// Host the URLs were derived from.
    pub host: String,

    /// Port the URLs were derived from.
    pub port: u16,

    /// HTTP control endpoint.
    pub http: String,

    /// WebSocket stream endpoint.
    pub stream: String,
}

impl ServiceUrls {
    /// Derive the endpoint set for a host and port.
    ///
    /// The default web port is left out of the URLs; any other port is
    /// spelled explicitly.
    pub fn compute(host: &str, port: u16) -> Self {
        let (http, stream) = if port == DEFAULT_HTTP_PORT {
            (
                format!("http://{host}/"),
                format!("ws://{host}{STREAM_PATH}"),
            )
        } else {
            (
                format!("http://{host}:{port}/"),
                format!("ws://{host}:{port}{STREAM_PATH}"),
            )
        };

        Self {
            host: host.to_string(),
            port,
            http,
            stream,
        }
    }
}
