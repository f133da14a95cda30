//! Integration tests for the connectivity engine.
//!
//! These drive the full scan -> rank -> connect-or-fallback sequence
//! against in-memory collaborator implementations and verify the terminal
//! state, the selection policy and the failure fallbacks.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use camnode_conn::{
    AccessPointProfile, AddressingMode, CaptivePortalDns, ConnectAttempt, ConnectPoll,
    ConnectivityEngine, ConnectivityState, EngineConfig, NetworkDirectory, RadioError,
    ScanCandidate, ServiceAdvertiser, StationAddress, WirelessRadio,
};
use camnode_core::obfuscate;
use camnode_core::prefs::{ConnectionPrefs, StaticIpPrefs, StationPrefs};

// ============================================================================
// Mock collaborators
// ============================================================================

/// One recorded `start_connect` call.
#[derive(Debug, Clone)]
struct RecordedAttempt {
    identity: String,
    link_address: Option<String>,
    secret: String,
    static_addressing: bool,
    hostname: String,
}

#[derive(Default)]
struct RadioLog {
    scan_calls: usize,
    attempts: Vec<RecordedAttempt>,
    ap_profiles: Vec<AccessPointProfile>,
}

/// How the mock radio answers connection polls.
enum ConnectScript {
    /// Report `Connected` after the given number of `Pending` polls.
    Succeed { after_polls: usize, address: StationAddress },
    /// Reject immediately.
    Reject(String),
    /// Never complete; the watchdog must fire.
    Hang,
}

struct MockRadio {
    scan_fails: bool,
    scan_result: Vec<ScanCandidate>,
    connect: ConnectScript,
    polls: usize,
    ap_fails: bool,
    ap_ip: Ipv4Addr,
    log: Arc<Mutex<RadioLog>>,
}

impl MockRadio {
    fn new(scan_result: Vec<ScanCandidate>) -> (Self, Arc<Mutex<RadioLog>>) {
        let log = Arc::new(Mutex::new(RadioLog::default()));
        let radio = Self {
            scan_fails: false,
            scan_result,
            connect: ConnectScript::Succeed {
                after_polls: 2,
                address: station_address(),
            },
            polls: 0,
            ap_fails: false,
            ap_ip: Ipv4Addr::new(192, 168, 4, 1),
            log: log.clone(),
        };
        (radio, log)
    }
}

impl WirelessRadio for MockRadio {
    fn scan(&mut self) -> Result<Vec<ScanCandidate>, RadioError> {
        self.log.lock().unwrap().scan_calls += 1;
        if self.scan_fails {
            return Err(RadioError::ScanFailed("radio busy".to_string()));
        }
        Ok(self.scan_result.clone())
    }

    fn start_connect(&mut self, attempt: &ConnectAttempt<'_>) -> Result<(), RadioError> {
        self.polls = 0;
        self.log.lock().unwrap().attempts.push(RecordedAttempt {
            identity: attempt.identity.to_string(),
            link_address: attempt.link_address.map(str::to_string),
            secret: attempt.secret.to_string(),
            static_addressing: matches!(attempt.addressing, AddressingMode::Static(_)),
            hostname: attempt.hostname.to_string(),
        });
        Ok(())
    }

    fn poll_connect(&mut self) -> ConnectPoll {
        match &self.connect {
            ConnectScript::Succeed { after_polls, address } => {
                if self.polls >= *after_polls {
                    ConnectPoll::Connected(*address)
                } else {
                    self.polls += 1;
                    ConnectPoll::Pending
                }
            }
            ConnectScript::Reject(reason) => ConnectPoll::Rejected(reason.clone()),
            ConnectScript::Hang => ConnectPoll::Pending,
        }
    }

    fn enable_access_point(
        &mut self,
        profile: &AccessPointProfile,
    ) -> Result<Ipv4Addr, RadioError> {
        self.log.lock().unwrap().ap_profiles.push(profile.clone());
        if self.ap_fails {
            return Err(RadioError::ApSetupFailed("softap init failed".to_string()));
        }
        Ok(self.ap_ip)
    }
}

#[derive(Default)]
struct PortalLog {
    started_with: Option<Ipv4Addr>,
    processed: usize,
}

struct MockPortal {
    log: Arc<Mutex<PortalLog>>,
}

impl MockPortal {
    fn new() -> (Self, Arc<Mutex<PortalLog>>) {
        let log = Arc::new(Mutex::new(PortalLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl CaptivePortalDns for MockPortal {
    fn start(&mut self, ap_ip: Ipv4Addr) -> Result<(), RadioError> {
        self.log.lock().unwrap().started_with = Some(ap_ip);
        Ok(())
    }

    fn process_next_request(&mut self) {
        self.log.lock().unwrap().processed += 1;
    }
}

struct MockAdvertiser {
    log: Arc<Mutex<Vec<(String, u16)>>>,
}

impl MockAdvertiser {
    fn new() -> (Self, Arc<Mutex<Vec<(String, u16)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Self { log: log.clone() }, log)
    }
}

impl ServiceAdvertiser for MockAdvertiser {
    fn advertise_service(&mut self, name: &str, port: u16) -> Result<(), RadioError> {
        self.log.lock().unwrap().push((name.to_string(), port));
        Ok(())
    }
}

// ============================================================================
// Test helpers
// ============================================================================

fn station_address() -> StationAddress {
    StationAddress {
        ip: Ipv4Addr::new(192, 168, 1, 50),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::new(192, 168, 1, 1),
    }
}

fn candidate(ssid: &str, signal_dbm: i32, bssid: &str) -> ScanCandidate {
    ScanCandidate {
        identity: ssid.to_string(),
        signal_dbm,
        link_address: bssid.to_string(),
    }
}

fn station(ssid: &str, plain_pass: &str) -> StationPrefs {
    StationPrefs {
        ssid: ssid.to_string(),
        pass: obfuscate::encode(plain_pass),
        dhcp: true,
    }
}

fn base_prefs(stations: Vec<StationPrefs>) -> ConnectionPrefs {
    ConnectionPrefs {
        mdns_name: "camnode".to_string(),
        stations,
        ap_ssid: "camnode-setup".to_string(),
        ..Default::default()
    }
}

/// Build an engine with a watchdog short enough for tests.
fn engine_for(prefs: &ConnectionPrefs, radio: MockRadio) -> ConnectivityEngine {
    let config = EngineConfig {
        watchdog: Duration::from_millis(40),
        poll_interval: Duration::from_millis(1),
        ..EngineConfig::from_prefs(prefs)
    };
    ConnectivityEngine::new(NetworkDirectory::from_prefs(prefs), config, Box::new(radio))
}

// ============================================================================
// Selection and station connect
// ============================================================================

#[test]
fn test_connect_success_reaches_connected_station() {
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (radio, log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);
    let (advertiser, services) = MockAdvertiser::new();

    let mut engine = engine_for(&prefs, radio).with_advertiser(Box::new(advertiser));
    let state = engine.start();

    assert_eq!(state, ConnectivityState::ConnectedStation);
    assert_eq!(engine.address(), Some(Ipv4Addr::new(192, 168, 1, 50)));
    assert_eq!(engine.http_url(), Some("http://192.168.1.50/"));
    assert_eq!(engine.stream_url(), Some("ws://192.168.1.50/ws"));

    let log = log.lock().unwrap();
    assert_eq!(log.scan_calls, 1);
    assert_eq!(log.attempts.len(), 1);
    assert_eq!(log.attempts[0].identity, "Home");
    assert_eq!(log.attempts[0].secret, "secret1");
    assert_eq!(log.attempts[0].hostname, "camnode");
    assert!(log.ap_profiles.is_empty());

    assert_eq!(services.lock().unwrap().as_slice(), &[("http".to_string(), 80)]);
}

#[test]
fn test_only_directory_match_wins_despite_weaker_signal() {
    // "Home" is the only known network; the stronger "Other" is ignored.
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (radio, log) = MockRadio::new(vec![
        candidate("Home", -40, "AA:AA:AA:AA:AA:01"),
        candidate("Other", -30, "BB:BB:BB:BB:BB:01"),
    ]);

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedStation);
    assert_eq!(log.lock().unwrap().attempts[0].identity, "Home");
}

#[test]
fn test_selects_strongest_among_matches() {
    let prefs = base_prefs(vec![station("Home", "a"), station("Office", "b")]);
    let (radio, log) = MockRadio::new(vec![
        candidate("Office", -70, "BB:BB:BB:BB:BB:01"),
        candidate("Home", -45, "AA:AA:AA:AA:AA:01"),
        candidate("Office", -60, "BB:BB:BB:BB:BB:02"),
    ]);

    let mut engine = engine_for(&prefs, radio);
    engine.start();

    let log = log.lock().unwrap();
    assert_eq!(log.attempts[0].identity, "Home");
    assert_eq!(log.attempts[0].link_address.as_deref(), Some("AA:AA:AA:AA:AA:01"));
}

#[test]
fn test_signal_tie_keeps_first_seen_candidate() {
    // Duplicated SSID (roaming access points) at equal strength: the
    // earliest-seen access point wins.
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (radio, log) = MockRadio::new(vec![
        candidate("Home", -50, "AA:AA:AA:AA:AA:01"),
        candidate("Home", -50, "AA:AA:AA:AA:AA:02"),
    ]);

    let mut engine = engine_for(&prefs, radio);
    engine.start();

    assert_eq!(
        log.lock().unwrap().attempts[0].link_address.as_deref(),
        Some("AA:AA:AA:AA:AA:01")
    );
}

#[test]
fn test_bssid_matched_entry_identity_is_refreshed() {
    // The entry pins a BSSID; after connecting, the cached identity is
    // updated to the network's current SSID.
    let prefs = base_prefs(vec![station("AA:AA:AA:AA:AA:01", "pinned")]);
    let (radio, log) = MockRadio::new(vec![candidate("HomeNet", -40, "AA:AA:AA:AA:AA:01")]);

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedStation);

    assert_eq!(log.lock().unwrap().attempts[0].identity, "HomeNet");
    assert_eq!(engine.directory().entry(0).unwrap().identity, "HomeNet");
}

#[test]
fn test_static_addressing_is_applied_when_complete() {
    let mut prefs = base_prefs(vec![StationPrefs {
        ssid: "Home".to_string(),
        pass: obfuscate::encode("secret1"),
        dhcp: false,
    }]);
    prefs.static_ip = Some(StaticIpPrefs {
        ip: Some("192.168.1.60".into()),
        netmask: Some("255.255.255.0".into()),
        gateway: Some("192.168.1.1".into()),
        ..Default::default()
    });
    let (radio, log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);

    let mut engine = engine_for(&prefs, radio);
    engine.start();

    assert!(log.lock().unwrap().attempts[0].static_addressing);
}

#[test]
fn test_incomplete_static_addressing_falls_back_to_dhcp() {
    let mut prefs = base_prefs(vec![StationPrefs {
        ssid: "Home".to_string(),
        pass: obfuscate::encode("secret1"),
        dhcp: false,
    }]);
    prefs.static_ip = Some(StaticIpPrefs {
        ip: Some("192.168.1.60".into()),
        ..Default::default()
    });
    let (radio, log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);

    let mut engine = engine_for(&prefs, radio);
    engine.start();

    assert!(!log.lock().unwrap().attempts[0].static_addressing);
}

// ============================================================================
// Fallback policy
// ============================================================================

#[test]
fn test_force_ap_skips_scan() {
    let mut prefs = base_prefs(vec![station("Home", "secret1")]);
    prefs.accesspoint = true;
    let (radio, log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);

    let log = log.lock().unwrap();
    assert_eq!(log.scan_calls, 0);
    assert!(log.attempts.is_empty());
    assert_eq!(log.ap_profiles.len(), 1);
    assert_eq!(log.ap_profiles[0].ssid, "camnode-setup");
}

#[test]
fn test_empty_directory_enters_ap_fallback() {
    // No known networks at all: fallback regardless of what the scan sees.
    let prefs = base_prefs(vec![]);
    let (radio, log) = MockRadio::new(vec![
        candidate("Other", -30, "BB:BB:BB:BB:BB:01"),
        candidate("Another", -40, "CC:CC:CC:CC:CC:01"),
    ]);

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);
    assert!(log.lock().unwrap().attempts.is_empty());
}

#[test]
fn test_no_matching_candidate_enters_ap_fallback() {
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (radio, log) = MockRadio::new(vec![candidate("Other", -30, "BB:BB:BB:BB:BB:01")]);

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);
    assert!(log.lock().unwrap().attempts.is_empty());
}

#[test]
fn test_scan_failure_is_treated_as_no_results() {
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (mut radio, log) = MockRadio::new(vec![]);
    radio.scan_fails = true;

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);
    assert_eq!(log.lock().unwrap().scan_calls, 1);
}

#[test]
fn test_connect_timeout_falls_back_after_single_attempt() {
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (mut radio, log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);
    radio.connect = ConnectScript::Hang;

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);

    let log = log.lock().unwrap();
    assert_eq!(log.attempts.len(), 1, "exactly one attempt, no retry");
    assert_eq!(log.ap_profiles.len(), 1);
}

#[test]
fn test_connect_rejection_falls_back_after_single_attempt() {
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (mut radio, log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);
    radio.connect = ConnectScript::Reject("auth failure".to_string());

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);
    assert_eq!(log.lock().unwrap().attempts.len(), 1);
}

#[test]
fn test_ap_bringup_failure_is_fatal_to_connectivity() {
    let prefs = base_prefs(vec![]);
    let (mut radio, _log) = MockRadio::new(vec![]);
    radio.ap_fails = true;

    let mut engine = engine_for(&prefs, radio);
    assert_eq!(engine.start(), ConnectivityState::Failed);
    assert_eq!(engine.address(), None);
    assert_eq!(engine.http_url(), None);
}

#[test]
fn test_start_after_bring_up_is_a_no_op() {
    let prefs = base_prefs(vec![]);
    let (radio, log) = MockRadio::new(vec![]);

    let mut engine = engine_for(&prefs, radio);
    let first = engine.start();
    let second = engine.start();

    assert_eq!(first, second);
    assert_eq!(log.lock().unwrap().ap_profiles.len(), 1);
}

// ============================================================================
// Captive portal and endpoints
// ============================================================================

#[test]
fn test_captive_portal_started_when_profile_requests_it() {
    let prefs = base_prefs(vec![]); // ap_dhcp defaults to true
    let (radio, _log) = MockRadio::new(vec![]);
    let (portal, portal_log) = MockPortal::new();

    let mut engine = engine_for(&prefs, radio).with_captive_portal(Box::new(portal));
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);

    assert_eq!(
        portal_log.lock().unwrap().started_with,
        Some(Ipv4Addr::new(192, 168, 4, 1))
    );

    // Housekeeping forwards pending queries one at a time.
    engine.handle_portal_request();
    engine.handle_portal_request();
    assert_eq!(portal_log.lock().unwrap().processed, 2);
}

#[test]
fn test_captive_portal_not_started_when_profile_declines() {
    let mut prefs = base_prefs(vec![]);
    prefs.ap_dhcp = false;
    let (radio, _log) = MockRadio::new(vec![]);
    let (portal, portal_log) = MockPortal::new();

    let mut engine = engine_for(&prefs, radio).with_captive_portal(Box::new(portal));
    assert_eq!(engine.start(), ConnectivityState::ConnectedAp);

    assert_eq!(portal_log.lock().unwrap().started_with, None);

    // With no active portal, housekeeping is a no-op.
    engine.handle_portal_request();
    assert_eq!(portal_log.lock().unwrap().processed, 0);
}

#[test]
fn test_ap_fallback_derives_urls_from_ap_address() {
    let mut prefs = base_prefs(vec![]);
    prefs.http_port = 8080;
    let (radio, _log) = MockRadio::new(vec![]);

    let mut engine = engine_for(&prefs, radio);
    engine.start();

    assert_eq!(engine.http_url(), Some("http://192.168.4.1:8080/"));
    assert_eq!(engine.stream_url(), Some("ws://192.168.4.1:8080/ws"));
}

#[test]
fn test_host_override_is_used_in_urls() {
    let mut prefs = base_prefs(vec![station("Home", "secret1")]);
    prefs.host_name = Some("cam.local".to_string());
    let (radio, _log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);

    let mut engine = engine_for(&prefs, radio);
    engine.start();

    assert_eq!(engine.http_url(), Some("http://cam.local/"));
}

#[test]
fn test_set_http_port_recomputes_urls() {
    let prefs = base_prefs(vec![station("Home", "secret1")]);
    let (radio, _log) = MockRadio::new(vec![candidate("Home", -40, "AA:AA:AA:AA:AA:01")]);

    let mut engine = engine_for(&prefs, radio);
    engine.start();
    assert_eq!(engine.http_url(), Some("http://192.168.1.50/"));

    engine.set_http_port(8080);
    assert_eq!(engine.http_url(), Some("http://192.168.1.50:8080/"));
    assert_eq!(engine.stream_url(), Some("ws://192.168.1.50:8080/ws"));
}

#[test]
fn test_status_reports_state_uptime_and_sync() {
    let prefs = base_prefs(vec![]);
    let (radio, _log) = MockRadio::new(vec![]);

    let mut engine = engine_for(&prefs, radio);

    let before = engine.status();
    assert_eq!(before.state, ConnectivityState::Idle);
    assert_eq!(before.uptime, Duration::ZERO);
    assert_eq!(before.last_sync_display(), "never");

    engine.start();
    engine.note_time_sync();

    let after = engine.status();
    assert_eq!(after.state, ConnectivityState::ConnectedAp);
    assert!(after.last_sync.is_some());
    assert_ne!(after.last_sync_display(), "never");
}
