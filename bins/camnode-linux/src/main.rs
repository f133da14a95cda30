//! Camnode appliance harness for Linux.
//!
//! Runs the connectivity bring-up against a simulated radio so the engine,
//! preference store and status surface can be exercised on a development
//! host. The simulated neighborhood always contains the seeded "Home"
//! network, so a fresh run connects in station mode; `--force-ap` drives
//! the access point fallback path instead.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use camnode_conn::{
    AccessPointProfile, CaptivePortalDns, ConnectAttempt, ConnectPoll, ConnectivityEngine,
    EngineConfig, NetworkDirectory, RadioError, ScanCandidate, ServiceAdvertiser, StationAddress,
    WirelessRadio,
};
use camnode_core::prefs::{ConnectionPrefs, StationPrefs};
use camnode_core::{FilePrefStore, PrefStore, PREFS_TAG};

#[derive(Parser, Debug)]
#[command(name = "camnode", about = "Camnode connectivity harness")]
struct Args {
    /// Directory holding the preference records.
    #[arg(long, default_value = "./config")]
    config_dir: PathBuf,

    /// Force access-point mode, skipping the scan.
    #[arg(long)]
    force_ap: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,camnode_conn=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("camnode harness starting...");

    let store = FilePrefStore::new(&args.config_dir);
    if !store.exists(PREFS_TAG) {
        seed_demo_prefs(&store)?;
    }

    let mut prefs = ConnectionPrefs::load(&store);
    if args.force_ap {
        prefs.accesspoint = true;
    }

    let directory = NetworkDirectory::from_prefs(&prefs);
    let config = EngineConfig {
        // The simulated driver answers within a few polls; no need to sit
        // on the full watchdog during development.
        watchdog: Duration::from_secs(5),
        poll_interval: Duration::from_millis(100),
        ..EngineConfig::from_prefs(&prefs)
    };

    let mut engine = ConnectivityEngine::new(directory, config, Box::new(SimulatedRadio::new()))
        .with_captive_portal(Box::new(LoggingPortal))
        .with_advertiser(Box::new(LoggingAdvertiser));

    let state = engine.start();
    tracing::info!("bring-up finished: {state}");

    if state.is_online() {
        // Pretend the NTP collaborator synced right after coming online.
        engine.note_time_sync();

        if let Some(urls) = engine.urls() {
            tracing::info!("🚀 camnode ready!");
            tracing::info!("   Control: {}", urls.http);
            tracing::info!("   Stream:  {}", urls.stream);
        }
    } else {
        tracing::warn!("continuing without network services");
    }

    // Cooperative housekeeping loop, shared with the rest of the device.
    let mut ticks: u64 = 0;
    loop {
        engine.handle_portal_request();
        std::thread::sleep(Duration::from_millis(50));
        ticks += 1;
        if ticks % 200 == 0 {
            let status = engine.status();
            tracing::info!(
                "state={} uptime={} last_sync={}",
                status.state,
                status.uptime_display(),
                status.last_sync_display()
            );
        }
    }
}

/// Write a first-run demo record so the harness has something to connect to.
fn seed_demo_prefs(store: &FilePrefStore) -> anyhow::Result<()> {
    tracing::info!("no stored preferences, seeding demo record");
    let mut prefs = ConnectionPrefs {
        mdns_name: "camnode".to_string(),
        ap_ssid: "camnode-setup".to_string(),
        ..Default::default()
    };
    let mut home = StationPrefs {
        ssid: "Home".to_string(),
        pass: String::new(),
        dhcp: true,
    };
    home.set_password("demo secret");
    prefs.stations.push(home);
    prefs.set_ap_password("configure me");
    prefs.save(store)?;
    Ok(())
}

// ============================================================================
// Simulated collaborators
// ============================================================================

/// A radio driver that fabricates a small, stable WiFi neighborhood.
struct SimulatedRadio {
    polls_left: u32,
}

impl SimulatedRadio {
    fn new() -> Self {
        Self { polls_left: 3 }
    }
}

impl WirelessRadio for SimulatedRadio {
    fn scan(&mut self) -> Result<Vec<ScanCandidate>, RadioError> {
        Ok(vec![
            ScanCandidate {
                identity: "CoffeeShop".to_string(),
                signal_dbm: -48,
                link_address: "DE:AD:BE:EF:00:01".to_string(),
            },
            ScanCandidate {
                identity: "Home".to_string(),
                signal_dbm: -55,
                link_address: "DE:AD:BE:EF:00:02".to_string(),
            },
            ScanCandidate {
                identity: "Home".to_string(),
                signal_dbm: -62,
                link_address: "DE:AD:BE:EF:00:03".to_string(),
            },
        ])
    }

    fn start_connect(&mut self, attempt: &ConnectAttempt<'_>) -> Result<(), RadioError> {
        tracing::debug!(
            "simulated driver associating with {} as '{}'",
            attempt.identity,
            attempt.hostname
        );
        self.polls_left = 3;
        Ok(())
    }

    fn poll_connect(&mut self) -> ConnectPoll {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return ConnectPoll::Pending;
        }
        ConnectPoll::Connected(StationAddress {
            ip: Ipv4Addr::new(192, 168, 1, 50),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
        })
    }

    fn enable_access_point(
        &mut self,
        profile: &AccessPointProfile,
    ) -> Result<Ipv4Addr, RadioError> {
        tracing::debug!("simulated driver hosting '{}'", profile.ssid);
        Ok(profile.ip)
    }
}

/// Captive-portal stand-in that only reports activity.
struct LoggingPortal;

impl CaptivePortalDns for LoggingPortal {
    fn start(&mut self, ap_ip: Ipv4Addr) -> Result<(), RadioError> {
        tracing::info!("captive portal redirecting to {ap_ip}");
        Ok(())
    }

    fn process_next_request(&mut self) {}
}

/// mDNS stand-in that only reports advertisements.
struct LoggingAdvertiser;

impl ServiceAdvertiser for LoggingAdvertiser {
    fn advertise_service(&mut self, name: &str, port: u16) -> Result<(), RadioError> {
        tracing::info!("advertising {name} service on port {port}");
        Ok(())
    }
}
