//! The directory of known networks and the access-point profile.
//!
//! Built exactly once from the persisted record. Entries are owned value
//! records: secrets are decoded up front and static addressing is resolved
//! at build time, so nothing in the directory ever aliases scan-call-local
//! data. The directory has no public mutation API; once the engine starts,
//! its contents are fixed for the session.

use std::net::Ipv4Addr;

use camnode_core::prefs::{ConnectionPrefs, StaticAddrs};
use camnode_core::obfuscate;
use tracing::warn;

/// Upper bound on directory entries. Extra persisted entries are dropped.
pub const MAX_KNOWN_NETWORKS: usize = 5;

/// How a station obtains its address after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// Dynamic assignment by the joined network.
    Dhcp,
    /// Statically configured address set.
    Static(StaticAddrs),
}

/// One known external network, owned by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownNetwork {
    /// SSID, or a BSSID string when the entry pins a specific access point.
    pub identity: String,

    /// Plaintext secret (obfuscated only at rest).
    pub secret: String,

    /// Address acquisition for this network.
    pub addressing: AddressingMode,
}

/// The appliance's own access point, used in fallback mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointProfile {
    pub ssid: String,

    /// Plaintext secret.
    pub secret: String,

    pub channel: u8,

    /// Run the captive-portal DNS redirect on the access point.
    pub captive_dns: bool,

    /// The access point's own subnet address.
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// Bounded, ordered collection of known networks plus the AP profile.
#[derive(Debug, Clone)]
pub struct NetworkDirectory {
    entries: Vec<KnownNetwork>,
    ap: AccessPointProfile,
}

impl NetworkDirectory {
    /// Build the directory from the persisted record.
    ///
    /// Entries beyond [`MAX_KNOWN_NETWORKS`] are dropped. A station that
    /// requests static addressing without a usable `static_ip` block falls
    /// back to DHCP with a logged warning.
    pub fn from_prefs(prefs: &ConnectionPrefs) -> Self {
        let static_addrs = prefs.static_ip.as_ref().and_then(|s| s.resolve());

        let entries = prefs
            .stations
            .iter()
            .take(MAX_KNOWN_NETWORKS)
            .map(|station| {
                let addressing = if station.dhcp {
                    AddressingMode::Dhcp
                } else {
                    match static_addrs {
                        Some(addrs) => AddressingMode::Static(addrs),
                        None => {
                            warn!(
                                ssid = %station.ssid,
                                "static addressing requested but not usable, falling back to DHCP"
                            );
                            AddressingMode::Dhcp
                        }
                    }
                };
                KnownNetwork {
                    identity: station.ssid.clone(),
                    secret: station.password(),
                    addressing,
                }
            })
            .collect();

        let (ip, netmask) = prefs
            .ap_ip
            .clone()
            .unwrap_or_default()
            .resolve();

        let ap = AccessPointProfile {
            ssid: prefs.ap_ssid.clone(),
            secret: prefs.ap_password(),
            channel: prefs.ap_channel,
            captive_dns: prefs.ap_dhcp,
            ip,
            netmask,
        };

        Self { entries, ap }
    }

    /// Find the first entry whose identity matches the given SSID or
    /// link-layer address string.
    pub fn lookup(&self, identity: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.identity == identity)
    }

    /// Find the first entry matching either of a scan candidate's names.
    pub fn lookup_candidate(&self, ssid: &str, link_address: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.identity == ssid || e.identity == link_address)
    }

    pub fn entry(&self, index: usize) -> Option<&KnownNetwork> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[KnownNetwork] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The appliance's own access point profile.
    pub fn ap(&self) -> &AccessPointProfile {
        &self.ap
    }

    /// Refresh a matched entry's cached identity after a successful connect
    /// (e.g. the entry pinned a BSSID and the network's SSID changed).
    /// Bring-up only; the directory is immutable once a session is active.
    pub(crate) fn refresh_identity(&mut self, index: usize, identity: &str) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.identity = identity.to_string();
        }
    }
}
