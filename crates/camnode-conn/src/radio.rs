//! Collaborator contracts consumed by the connectivity engine.
//!
//! The engine never touches radio, DNS or mDNS primitives directly; it
//! drives them through these narrow traits. Platform integrations (ESP-IDF,
//! a Linux NetworkManager shim, the test mocks) implement them.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::directory::{AccessPointProfile, AddressingMode};

/// Errors reported by the radio-side collaborators.
#[derive(Debug, Error)]
pub enum RadioError {
    /// A network scan could not be carried out.
    #[error("scan failed: {0}")]
    ScanFailed(String),

    /// A connection attempt could not be initiated.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Access point bring-up failed.
    #[error("access point setup failed: {0}")]
    ApSetupFailed(String),

    /// The captive-portal DNS responder could not start.
    #[error("captive portal failed: {0}")]
    PortalFailed(String),

    /// Service advertisement failed.
    #[error("service advertisement failed: {0}")]
    AdvertiseFailed(String),
}

/// One network observed during a scan. Transient; discarded after ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Broadcast SSID.
    pub identity: String,

    /// Received signal strength in dBm (larger is stronger).
    pub signal_dbm: i32,

    /// BSSID of the specific access point.
    pub link_address: String,
}

/// Address information reported once a station connection is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationAddress {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// Everything the radio needs to join one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt<'a> {
    /// SSID to join.
    pub identity: &'a str,

    /// Pin the attempt to a specific access point, when known.
    pub link_address: Option<&'a str>,

    /// Plaintext secret.
    pub secret: &'a str,

    /// DHCP or a pre-resolved static address set.
    pub addressing: AddressingMode,

    /// Host name to register with the joined network.
    pub hostname: &'a str,
}

/// Result of polling an in-flight connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectPoll {
    /// Still negotiating; poll again.
    Pending,

    /// Association and addressing complete.
    Connected(StationAddress),

    /// The driver gave up on the attempt.
    Rejected(String),
}

/// The radio scan/connect/AP primitives.
pub trait WirelessRadio {
    /// Perform one scan and return whatever was observed.
    fn scan(&mut self) -> Result<Vec<ScanCandidate>, RadioError>;

    /// Begin a station connection attempt. Completion is observed through
    /// [`WirelessRadio::poll_connect`].
    fn start_connect(&mut self, attempt: &ConnectAttempt<'_>) -> Result<(), RadioError>;

    /// Poll the in-flight attempt started by `start_connect`.
    fn poll_connect(&mut self) -> ConnectPoll;

    /// Configure and start the device's own access point, returning its
    /// address on success.
    fn enable_access_point(&mut self, profile: &AccessPointProfile) -> Result<Ipv4Addr, RadioError>;
}

/// Captive-portal DNS responder on the fallback access point.
pub trait CaptivePortalDns {
    /// Start answering queries, redirecting clients to `ap_ip`.
    fn start(&mut self, ap_ip: Ipv4Addr) -> Result<(), RadioError>;

    /// Forward one pending query, if any. Must return promptly.
    fn process_next_request(&mut self);
}

/// mDNS service advertisement.
pub trait ServiceAdvertiser {
    /// Advertise a service under the device name.
    fn advertise_service(&mut self, name: &str, port: u16) -> Result<(), RadioError>;
}
