//! Shared types for the API layer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::db::DatabaseError;
use crate::models::Role;
use crate::trackers::FinalizePolicy;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub db_path: Arc<PathBuf>,
    pub sessions: Arc<Mutex<SessionStore>>,
    pub policy: FinalizePolicy,
}

impl ApiContext {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path: Arc::new(db_path),
            sessions: Arc::new(Mutex::new(SessionStore::new())),
            policy: FinalizePolicy::default(),
        }
    }

    /// Open a fresh connection to the tracker database.
    ///
    /// Connection-per-request: SQLite in WAL mode handles concurrent
    /// readers, and handlers never hold a connection across requests.
    pub fn open_db(&self) -> Result<Connection, DatabaseError> {
        crate::db::sqlite::open_database(&self.db_path)
    }
}

// ═══════════════════════════════════════════════════════════
// Auth context — injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Authenticated caller, injected into request extensions by the auth
/// middleware after token validation.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
}

// ═══════════════════════════════════════════════════════════
// Session store — bearer token validation
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct SessionEntry {
    user_id: String,
    role: Role,
}

/// In-memory bearer session store. Only SHA-256 hashes of tokens are
/// kept; the plaintext token exists client-side only.
pub struct SessionStore {
    sessions: HashMap<[u8; 32], SessionEntry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Issue a fresh random token for the given user.
    pub fn issue(&mut self, user_id: &str, role: Role) -> String {
        let token = generate_token();
        self.insert(&token, user_id, role);
        token
    }

    /// Register an externally supplied token (e.g. seeded from config).
    pub fn insert(&mut self, token: &str, user_id: &str, role: Role) {
        self.sessions.insert(
            hash_token(token),
            SessionEntry {
                user_id: user_id.to_string(),
                role,
            },
        );
    }

    /// Look up a bearer token. Returns the caller identity on success.
    pub fn validate(&self, token: &str) -> Option<(String, Role)> {
        self.sessions
            .get(&hash_token(token))
            .map(|entry| (entry.user_id.clone(), entry.role))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates() {
        let mut store = SessionStore::new();
        let token = store.issue("alice@example.com", Role::Patient);
        let (user, role) = store.validate(&token).unwrap();
        assert_eq!(user, "alice@example.com");
        assert_eq!(role, Role::Patient);
    }

    #[test]
    fn unknown_token_rejected() {
        let store = SessionStore::new();
        assert!(store.validate("made-up-token").is_none());
    }

    #[test]
    fn seeded_token_validates() {
        let mut store = SessionStore::new();
        store.insert("fixed-token", "dr.chen@example.com", Role::Doctor);
        let (user, role) = store.validate("fixed-token").unwrap();
        assert_eq!(user, "dr.chen@example.com");
        assert_eq!(role, Role::Doctor);
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
        assert!(!t1.is_empty());
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("test"), hash_token("test"));
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }
}
