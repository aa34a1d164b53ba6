//! Admin login and session tokens.
//!
//! Sessions live in memory and expire after the configured TTL. Restarting the process
//! logs every admin out.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::AppError;

#[derive(Debug)]
pub struct SessionStore {
    admin_id: String,
    admin_password: String,
    ttl: Duration,
    sessions: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl SessionStore {
    pub fn new(admin_id: impl Into<String>, admin_password: impl Into<String>, ttl: Duration) -> Self {
        Self {
            admin_id: admin_id.into(),
            admin_password: admin_password.into(),
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Check the admin credential pair and open a session.
    ///
    /// Returns the session token, 64 hex characters.
    pub async fn login(&self, admin_id: &str, password: &str) -> Result<String, AppError> {
        if admin_id != self.admin_id || password != self.admin_password {
            tracing::warn!(%admin_id, "admin login rejected");
            return Err(AppError::Unauthorized);
        }

        let token = hex::encode(rand::random::<[u8; 32]>());
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, expires_at| *expires_at > now);
        sessions.insert(token.clone(), expires_at);

        tracing::info!(%admin_id, "admin logged in");
        Ok(token)
    }

    /// Whether `token` names a live session.
    pub async fn validate(&self, token: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .is_some_and(|expires_at| *expires_at > Utc::now())
    }
}
