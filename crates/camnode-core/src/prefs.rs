//! The persisted connection preference record.
//!
//! This is the one canonical schema for the connectivity subsystem. Field
//! names are fixed; unknown fields are ignored and missing fields fall back
//! to compiled defaults, so a partial record always loads. The `mdns_name`
//! field gates the whole record: without a non-empty device name the rest is
//! ignored and defaults are kept.
//!
//! Secrets (`pass`, `ap_pass`, `ota_password`) are stored obfuscated (see
//! [`crate::obfuscate`]) and only decoded on access.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::obfuscate;
use crate::storage::{PrefStore, StorageError};

/// Storage tag under which the connection record is persisted.
pub const PREFS_TAG: &str = "conn";

/// Errors that can occur while handling the preference record.
#[derive(Debug, Error)]
pub enum PrefsError {
    /// The stored record could not be parsed.
    #[error("preference record is malformed: {0}")]
    Malformed(String),

    /// The record could not be serialized for saving.
    #[error("failed to serialize preference record: {0}")]
    Serialize(String),

    /// The storage collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One known external network entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationPrefs {
    /// Network identity: SSID, or a BSSID string for a pinned access point.
    pub ssid: String,

    /// Obfuscated password.
    #[serde(default)]
    pub pass: String,

    /// Use DHCP when joining this network; `false` applies `static_ip`.
    #[serde(default = "default_true")]
    pub dhcp: bool,
}

impl StationPrefs {
    /// Plaintext password.
    pub fn password(&self) -> String {
        obfuscate::decode(&self.pass)
    }

    /// Store a plaintext password in obfuscated form.
    pub fn set_password(&mut self, plain: &str) {
        self.pass = obfuscate::encode(plain);
    }
}

/// Static station addressing, all fields optional strings in the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticIpPrefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns1: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns2: Option<String>,
}

/// A fully parsed static address set.
///
/// Only produced when the record holds a usable ip/netmask/gateway triple;
/// anything less falls back to DHCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticAddrs {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns1: Option<Ipv4Addr>,
    pub dns2: Option<Ipv4Addr>,
}

impl StaticIpPrefs {
    /// Parse into a usable static address set.
    ///
    /// Returns `None` (with a logged warning) when any required field is
    /// absent or malformed; the caller then uses DHCP.
    pub fn resolve(&self) -> Option<StaticAddrs> {
        let required = |field: &Option<String>, name: &str| -> Option<Ipv4Addr> {
            match field.as_deref().map(str::parse::<Ipv4Addr>) {
                Some(Ok(addr)) => Some(addr),
                Some(Err(_)) => {
                    warn!("static {} is not a valid IPv4 address", name);
                    None
                }
                None => {
                    warn!("static {} is not configured", name);
                    None
                }
            }
        };

        let ip = required(&self.ip, "ip")?;
        let netmask = required(&self.netmask, "netmask")?;
        let gateway = required(&self.gateway, "gateway")?;

        let optional = |field: &Option<String>| -> Option<Ipv4Addr> {
            field.as_deref().and_then(|s| s.parse().ok())
        };

        Some(StaticAddrs {
            ip,
            netmask,
            gateway,
            dns1: optional(&self.dns1),
            dns2: optional(&self.dns2),
        })
    }
}

/// The access point's own subnet address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApIpPrefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
}

impl ApIpPrefs {
    /// Parse the AP subnet, falling back to the stock appliance subnet
    /// (192.168.4.1/24) when absent or malformed.
    pub fn resolve(&self) -> (Ipv4Addr, Ipv4Addr) {
        let ip = match self.ip.as_deref().map(str::parse) {
            Some(Ok(addr)) => addr,
            Some(Err(_)) => {
                warn!("AP IP is invalid, using default");
                DEFAULT_AP_IP
            }
            None => DEFAULT_AP_IP,
        };
        let netmask = self
            .netmask
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_AP_NETMASK);
        (ip, netmask)
    }
}

/// Stock access point subnet when the record does not configure one.
pub const DEFAULT_AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
/// Stock access point netmask.
pub const DEFAULT_AP_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// The full persisted connection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPrefs {
    /// Device name advertised over mDNS. Gates the record: when empty the
    /// rest of the stored record is ignored and defaults apply.
    #[serde(default)]
    pub mdns_name: String,

    /// Host name override for derived service URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,

    /// HTTP service port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Global DHCP flag for station mode.
    #[serde(default = "default_true")]
    pub dhcp: bool,

    /// Known external networks, persisted order preserved.
    #[serde(default)]
    pub stations: Vec<StationPrefs>,

    /// Static station addressing, used by entries with `dhcp: false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip: Option<StaticIpPrefs>,

    /// Force access-point mode, skipping the scan entirely.
    #[serde(default)]
    pub accesspoint: bool,

    /// Access point SSID.
    #[serde(default)]
    pub ap_ssid: String,

    /// Access point password, obfuscated.
    #[serde(default)]
    pub ap_pass: String,

    /// Access point radio channel.
    #[serde(default = "default_ap_channel")]
    pub ap_channel: u8,

    /// Run DHCP (and the captive portal) on the access point.
    #[serde(default = "default_true")]
    pub ap_dhcp: bool,

    /// Access point subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap_ip: Option<ApIpPrefs>,

    /// Configuration UI user name.
    #[serde(default = "default_admin")]
    pub user: String,

    /// Configuration UI password.
    #[serde(default = "default_admin")]
    pub pwd: String,

    /// Allow over-the-air updates.
    #[serde(default)]
    pub ota_enabled: bool,

    /// OTA password, obfuscated.
    #[serde(default)]
    pub ota_password: String,

    /// NTP server host name.
    #[serde(default)]
    pub ntp_server: String,

    /// GMT offset in seconds.
    #[serde(default)]
    pub gmt_offset: i64,

    /// Daylight saving offset in seconds.
    #[serde(default)]
    pub dst_offset: i32,

    /// Verbose diagnostic output.
    #[serde(default)]
    pub debug_mode: bool,
}

impl Default for ConnectionPrefs {
    fn default() -> Self {
        Self {
            mdns_name: String::new(),
            host_name: None,
            http_port: default_http_port(),
            dhcp: true,
            stations: Vec::new(),
            static_ip: None,
            accesspoint: false,
            ap_ssid: String::new(),
            ap_pass: String::new(),
            ap_channel: default_ap_channel(),
            ap_dhcp: true,
            ap_ip: None,
            user: default_admin(),
            pwd: default_admin(),
            ota_enabled: false,
            ota_password: String::new(),
            ntp_server: String::new(),
            gmt_offset: 0,
            dst_offset: 0,
            debug_mode: false,
        }
    }
}

fn default_http_port() -> u16 {
    80
}

fn default_ap_channel() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_admin() -> String {
    "admin".to_string()
}

impl ConnectionPrefs {
    /// Parse a record from its stored JSON text.
    ///
    /// A record without a non-empty `mdns_name` is treated as absent: the
    /// compiled defaults are returned and the rest of the text is ignored.
    pub fn from_json(text: &str) -> Result<Self, PrefsError> {
        let prefs: ConnectionPrefs =
            serde_json::from_str(text).map_err(|e| PrefsError::Malformed(e.to_string()))?;

        if prefs.mdns_name.is_empty() {
            warn!("stored record has no mdns_name, keeping defaults");
            return Ok(Self::default());
        }

        Ok(prefs)
    }

    /// Serialize the record to the stored JSON form.
    pub fn to_json(&self) -> Result<String, PrefsError> {
        serde_json::to_string_pretty(self).map_err(|e| PrefsError::Serialize(e.to_string()))
    }

    /// Load the record from a preference store.
    ///
    /// A missing record means compiled defaults; a malformed one is treated
    /// as missing and logged. Neither is fatal.
    pub fn load<S: PrefStore>(store: &S) -> Self {
        match store.load(PREFS_TAG) {
            Ok(text) => match Self::from_json(&text) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!("preference record could not be parsed, using defaults: {e}");
                    Self::default()
                }
            },
            Err(StorageError::NotFound(_)) => {
                info!("no stored preferences, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("preference load failed, using defaults: {e}");
                Self::default()
            }
        }
    }

    /// Save the record to a preference store.
    ///
    /// A failed save is reported to the caller; the store guarantees the
    /// prior on-disk record survives the failure.
    pub fn save<S: PrefStore>(&self, store: &S) -> Result<(), PrefsError> {
        let text = self.to_json()?;
        store.save(PREFS_TAG, &text)?;
        Ok(())
    }

    /// Plaintext access point password.
    pub fn ap_password(&self) -> String {
        obfuscate::decode(&self.ap_pass)
    }

    /// Store a plaintext access point password in obfuscated form.
    pub fn set_ap_password(&mut self, plain: &str) {
        self.ap_pass = obfuscate::encode(plain);
    }

    /// Plaintext OTA password.
    pub fn ota_password_plain(&self) -> String {
        obfuscate::decode(&self.ota_password)
    }

    /// Store a plaintext OTA password in obfuscated form.
    pub fn set_ota_password(&mut self, plain: &str) {
        self.ota_password = obfuscate::encode(plain);
    }
}
