//! # camnode-conn
//!
//! Connectivity orchestration for the camnode camera appliance.
//!
//! This crate provides:
//! - The bounded directory of known networks and the access-point profile
//!   (`directory`)
//! - The collaborator contracts for radio, captive-portal DNS and mDNS
//!   (`radio`)
//! - The scan -> rank -> connect-or-fallback state machine (`engine`)
//! - Service endpoint derivation (`resolver`) and status reporting
//!   (`status`)
//!
//! All decision logic is platform-agnostic; platform integrations implement
//! the `radio` traits.

pub mod directory;
pub mod engine;
pub mod radio;
pub mod resolver;
pub mod status;

pub use directory::{AccessPointProfile, AddressingMode, KnownNetwork, NetworkDirectory, MAX_KNOWN_NETWORKS};
pub use engine::{ConnectivityEngine, ConnectivityState, EngineConfig, DEFAULT_POLL_INTERVAL, DEFAULT_WATCHDOG};
pub use radio::{
    CaptivePortalDns, ConnectAttempt, ConnectPoll, RadioError, ScanCandidate, ServiceAdvertiser,
    StationAddress, WirelessRadio,
};
pub use resolver::{ServiceUrls, DEFAULT_HTTP_PORT, STREAM_PATH};
pub use status::StatusReport;
