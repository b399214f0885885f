use std::net::SocketAddr;
use std::path::PathBuf;

use crate::models::Role;
use crate::trackers::FinalizePolicy;

/// Application-level constants
pub const APP_NAME: &str = "MediSync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listen address when `MEDISYNC_ADDR` is unset.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Get the application data directory
/// ~/MediSync/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Get the tracker database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("medisync.db")
}

/// Listen address from `MEDISYNC_ADDR`, falling back to the default.
pub fn listen_addr() -> SocketAddr {
    std::env::var("MEDISYNC_ADDR")
        .ok()
        .and_then(|raw| {
            raw.parse()
                .map_err(|e| tracing::warn!("Ignoring invalid MEDISYNC_ADDR {raw:?}: {e}"))
                .ok()
        })
        .unwrap_or_else(|| {
            DEFAULT_LISTEN_ADDR
                .parse()
                .expect("default listen address is valid")
        })
}

/// Reminder finalization policy from `MEDISYNC_FINALIZE_POLICY`.
pub fn finalize_policy() -> FinalizePolicy {
    parse_finalize_policy(&std::env::var("MEDISYNC_FINALIZE_POLICY").unwrap_or_default())
}

/// `"sticky"` (the default) rejects re-marking a Taken/Missed reminder;
/// `"rewritable"` lets a patient overwrite a mis-click. Anything else is
/// logged and falls back to sticky.
pub fn parse_finalize_policy(raw: &str) -> FinalizePolicy {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "sticky" => FinalizePolicy::Sticky,
        "rewritable" => FinalizePolicy::Rewritable,
        other => {
            tracing::warn!("Ignoring unknown MEDISYNC_FINALIZE_POLICY {other:?}, using sticky");
            FinalizePolicy::Sticky
        }
    }
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "medisync=info,tower_http=warn"
}

/// Parse seeded sessions from `MEDISYNC_SESSIONS`.
///
/// Format: `token=user:role` entries separated by commas, e.g.
/// `abc123=alice@example.com:patient,def456=dr.chen@example.com:doctor`.
/// Malformed entries are logged and skipped.
pub fn seeded_sessions(raw: &str) -> Vec<(String, String, Role)> {
    use std::str::FromStr;

    let mut sessions = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parsed = entry.split_once('=').and_then(|(token, identity)| {
            let (user, role) = identity.split_once(':')?;
            let role = Role::from_str(role).ok()?;
            Some((token.to_string(), user.to_string(), role))
        });
        match parsed {
            Some(session) => sessions.push(session),
            None => tracing::warn!("Ignoring malformed MEDISYNC_SESSIONS entry {entry:?}"),
        }
    }
    sessions
}
