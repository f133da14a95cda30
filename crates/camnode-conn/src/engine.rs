//! The connectivity state machine.
//!
//! One blocking [`ConnectivityEngine::start`] call during device bring-up
//! decides whether the appliance joins a known network or hosts its own
//! access point, then leaves the engine in a terminal state the rest of the
//! device reads. Collaborators (radio, captive-portal DNS, mDNS) are
//! injected at construction; the engine holds no global state.
//!
//! Failure policy: everything recoverable degrades to a safer fallback
//! (scan failure -> no candidates, connect timeout/rejection -> access
//! point fallback). Only access point bring-up failure is terminal for
//! connectivity, and even that leaves the rest of the device running.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use camnode_core::prefs::ConnectionPrefs;
use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

use crate::directory::{AddressingMode, NetworkDirectory};
use crate::radio::{
    CaptivePortalDns, ConnectAttempt, ConnectPoll, ScanCandidate, ServiceAdvertiser, WirelessRadio,
};
use crate::resolver::ServiceUrls;
use crate::status::StatusReport;

/// Default ceiling on one station connection attempt.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(30);

/// Default pause between connection polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connectivity lifecycle. Exactly one value at a time; transitions only
/// move forward within one bring-up cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Idle,
    Scanning,
    ConnectingStation,
    ApFallback,
    ConnectedStation,
    ConnectedAp,
    Failed,
}

impl ConnectivityState {
    /// Whether bring-up has finished in this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectivityState::ConnectedStation
                | ConnectivityState::ConnectedAp
                | ConnectivityState::Failed
        )
    }

    /// Whether the device has working network access in this state.
    pub fn is_online(self) -> bool {
        matches!(
            self,
            ConnectivityState::ConnectedStation | ConnectivityState::ConnectedAp
        )
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Idle => "idle",
            ConnectivityState::Scanning => "scanning",
            ConnectivityState::ConnectingStation => "connecting",
            ConnectivityState::ApFallback => "access point fallback",
            ConnectivityState::ConnectedStation => "connected (station)",
            ConnectivityState::ConnectedAp => "connected (access point)",
            ConnectivityState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Engine tuning and identity, derived from the preference record.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Go straight to access point mode, never scanning.
    pub force_access_point: bool,

    /// Device name registered with the network and advertised over mDNS.
    pub hostname: String,

    /// Host name override for derived URLs; the resolved address is used
    /// when absent.
    pub host_override: Option<String>,

    /// HTTP service port.
    pub http_port: u16,

    /// Ceiling on one station connection attempt.
    pub watchdog: Duration,

    /// Pause between connection polls.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            force_access_point: false,
            hostname: String::new(),
            host_override: None,
            http_port: 80,
            watchdog: DEFAULT_WATCHDOG,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Derive the engine configuration from the persisted record.
    pub fn from_prefs(prefs: &ConnectionPrefs) -> Self {
        Self {
            force_access_point: prefs.accesspoint,
            hostname: prefs.mdns_name.clone(),
            host_override: prefs.host_name.clone().filter(|h| !h.is_empty()),
            http_port: prefs.http_port,
            ..Default::default()
        }
    }
}

/// The connect-or-fallback engine.
pub struct ConnectivityEngine {
    config: EngineConfig,
    directory: NetworkDirectory,
    radio: Box<dyn WirelessRadio>,
    portal: Option<Box<dyn CaptivePortalDns>>,
    advertiser: Option<Box<dyn ServiceAdvertiser>>,
    state: ConnectivityState,
    address: Option<Ipv4Addr>,
    urls: Option<ServiceUrls>,
    started_at: Option<Instant>,
    last_sync: Option<DateTime<Local>>,
    portal_active: bool,
}

impl ConnectivityEngine {
    /// Create an engine over a directory and a radio collaborator.
    pub fn new(
        directory: NetworkDirectory,
        config: EngineConfig,
        radio: Box<dyn WirelessRadio>,
    ) -> Self {
        Self {
            config,
            directory,
            radio,
            portal: None,
            advertiser: None,
            state: ConnectivityState::Idle,
            address: None,
            urls: None,
            started_at: None,
            last_sync: None,
            portal_active: false,
        }
    }

    /// Attach the captive-portal DNS collaborator.
    pub fn with_captive_portal(mut self, portal: Box<dyn CaptivePortalDns>) -> Self {
        self.portal = Some(portal);
        self
    }

    /// Attach the mDNS advertisement collaborator.
    pub fn with_advertiser(mut self, advertiser: Box<dyn ServiceAdvertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Run the connect-or-fallback sequence to a terminal state.
    ///
    /// Blocking by design: device bring-up waits on the result before other
    /// subsystems initialize. The only suspension point is the bounded
    /// watchdog wait during a station attempt. Calling `start` again after
    /// bring-up is a no-op returning the settled state.
    pub fn start(&mut self) -> ConnectivityState {
        if self.started_at.is_some() {
            warn!("bring-up already ran, state is {}", self.state);
            return self.state;
        }
        self.started_at = Some(Instant::now());
        info!("starting connectivity bring-up");

        if self.config.force_access_point {
            info!("access point mode is forced, skipping scan");
            self.enter_ap_fallback();
        } else {
            self.transition(ConnectivityState::Scanning);
            let candidates = match self.radio.scan() {
                Ok(found) => found,
                Err(e) => {
                    warn!("scan failed, treating as no results: {e}");
                    Vec::new()
                }
            };
            info!("{} networks found", candidates.len());

            match self.select_candidate(&candidates) {
                Some((index, candidate)) => {
                    let candidate = candidate.clone();
                    if !self.connect_station(index, &candidate) {
                        // Single attempt only; any failure falls back.
                        self.enter_ap_fallback();
                    }
                }
                None => {
                    info!("no known networks found, entering access point fallback");
                    self.enter_ap_fallback();
                }
            }
        }

        self.finish_bring_up();
        self.state
    }

    /// Rank scan results against the directory.
    ///
    /// The strongest signal among directory matches wins; ties keep the
    /// earliest-seen candidate, since scan ordering is otherwise not
    /// meaningful.
    fn select_candidate<'a>(
        &self,
        candidates: &'a [ScanCandidate],
    ) -> Option<(usize, &'a ScanCandidate)> {
        let mut best: Option<(usize, &ScanCandidate)> = None;
        for candidate in candidates {
            let Some(index) = self
                .directory
                .lookup_candidate(&candidate.identity, &candidate.link_address)
            else {
                debug!(
                    "[{}] {} ({} dBm)",
                    candidate.link_address, candidate.identity, candidate.signal_dbm
                );
                continue;
            };
            debug!(
                "[{}] {} ({} dBm) - known",
                candidate.link_address, candidate.identity, candidate.signal_dbm
            );
            if best.map_or(true, |(_, seen)| candidate.signal_dbm > seen.signal_dbm) {
                best = Some((index, candidate));
            }
        }
        best
    }

    /// Attempt one station connection. Returns whether it succeeded.
    fn connect_station(&mut self, index: usize, candidate: &ScanCandidate) -> bool {
        self.transition(ConnectivityState::ConnectingStation);

        let Some(entry) = self.directory.entry(index) else {
            return false;
        };
        let secret = entry.secret.clone();
        let stored_identity = entry.identity.clone();
        let addressing = entry.addressing;
        if let AddressingMode::Static(_) = addressing {
            info!("applying static address settings");
        }

        info!(
            "connecting to {} [{}]",
            candidate.identity, candidate.link_address
        );
        let attempt = ConnectAttempt {
            identity: &candidate.identity,
            link_address: Some(&candidate.link_address),
            secret: &secret,
            addressing,
            hostname: &self.config.hostname,
        };
        if let Err(e) = self.radio.start_connect(&attempt) {
            warn!("connection attempt could not start: {e}");
            return false;
        }

        let deadline = Instant::now() + self.config.watchdog;
        loop {
            match self.radio.poll_connect() {
                ConnectPoll::Connected(addr) => {
                    info!("station connection succeeded");
                    info!("ip address: {}", addr.ip);
                    info!("netmask   : {}", addr.netmask);
                    info!("gateway   : {}", addr.gateway);
                    self.address = Some(addr.ip);
                    if stored_identity != candidate.identity {
                        self.directory.refresh_identity(index, &candidate.identity);
                    }
                    self.transition(ConnectivityState::ConnectedStation);
                    return true;
                }
                ConnectPoll::Rejected(reason) => {
                    warn!("station connection rejected: {reason}");
                    return false;
                }
                ConnectPoll::Pending => {
                    if Instant::now() >= deadline {
                        warn!(
                            "station connection timed out after {:?}",
                            self.config.watchdog
                        );
                        return false;
                    }
                    std::thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    /// Bring up the device's own access point.
    fn enter_ap_fallback(&mut self) {
        self.transition(ConnectivityState::ApFallback);

        let profile = self.directory.ap().clone();
        info!(
            "setting up access point '{}' (channel={})",
            profile.ssid, profile.channel
        );
        match self.radio.enable_access_point(&profile) {
            Ok(ip) => {
                info!("access point up, ip {ip}");
                self.address = Some(ip);
                if profile.captive_dns {
                    self.start_captive_portal(ip);
                }
                self.transition(ConnectivityState::ConnectedAp);
            }
            Err(e) => {
                error!("access point init failed: {e}");
                self.transition(ConnectivityState::Failed);
            }
        }
    }

    fn start_captive_portal(&mut self, ap_ip: Ipv4Addr) {
        let Some(portal) = self.portal.as_mut() else {
            debug!("no captive portal collaborator configured");
            return;
        };
        match portal.start(ap_ip) {
            Ok(()) => {
                self.portal_active = true;
                info!("captive portal started");
            }
            Err(e) => warn!("captive portal could not start: {e}"),
        }
    }

    /// Derive service URLs and advertise the HTTP service once online.
    fn finish_bring_up(&mut self) {
        if !self.state.is_online() {
            return;
        }
        self.recompute_urls();
        if let Some(urls) = &self.urls {
            info!("device reachable at {}", urls.http);
        }
        if let Some(advertiser) = self.advertiser.as_mut() {
            if let Err(e) = advertiser.advertise_service("http", self.config.http_port) {
                warn!("mDNS advertisement failed: {e}");
            }
        }
    }

    fn recompute_urls(&mut self) {
        let Some(ip) = self.address else {
            self.urls = None;
            return;
        };
        let host = match &self.config.host_override {
            Some(host) => host.clone(),
            None => ip.to_string(),
        };
        self.urls = Some(ServiceUrls::compute(&host, self.config.http_port));
    }

    fn transition(&mut self, next: ConnectivityState) {
        debug!("connectivity: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Pure diagnostic snapshot: state, uptime, last time sync.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.state,
            uptime: self.started_at.map(|t| t.elapsed()).unwrap_or_default(),
            last_sync: self.last_sync,
        }
    }

    /// Forward one pending captive-portal query, if the portal is active.
    /// Intended for the device's cooperative housekeeping loop; returns
    /// promptly and never blocks on network I/O.
    pub fn handle_portal_request(&mut self) {
        if !self.portal_active {
            return;
        }
        if let Some(portal) = self.portal.as_mut() {
            portal.process_next_request();
        }
    }

    /// Record a successful time sync (called by the NTP collaborator).
    pub fn note_time_sync(&mut self) {
        self.last_sync = Some(Local::now());
        debug!("time synchronized");
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    /// The address resolved at bring-up, if any.
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    /// The derived endpoint set, once online.
    pub fn urls(&self) -> Option<&ServiceUrls> {
        self.urls.as_ref()
    }

    /// The HTTP control URL, once online.
    pub fn http_url(&self) -> Option<&str> {
        self.urls.as_ref().map(|u| u.http.as_str())
    }

    /// The WebSocket stream URL, once online.
    pub fn stream_url(&self) -> Option<&str> {
        self.urls.as_ref().map(|u| u.stream.as_str())
    }

    pub fn http_port(&self) -> u16 {
        self.config.http_port
    }

    /// Change the HTTP port and recompute the derived URLs immediately.
    pub fn set_http_port(&mut self, port: u16) {
        self.config.http_port = port;
        self.recompute_urls();
    }

    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// The directory the engine was built over.
    pub fn directory(&self) -> &NetworkDirectory {
        &self.directory
    }
}
