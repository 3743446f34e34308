//! In-memory wallet sessions.
//!
//! Sessions live for a fixed TTL measured from the (renewable) login time.
//! Last-activity is refreshed lazily on validation, at most once per
//! activity interval, and a background task sweeps expired entries.

use crate::domain::{TimeMs, WalletAddress};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Window used by [`SessionStats::recent_sessions`].
const RECENT_ACTIVITY_MS: i64 = 30 * 60 * 1000;

/// How often the background sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub wallet_address: WalletAddress,
    pub is_admin: bool,
    pub login_time: TimeMs,
    pub last_activity: TimeMs,
    #[serde(skip)]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: usize,
    pub admin_sessions: usize,
    /// Sessions active in the last 30 minutes.
    pub recent_sessions: usize,
    pub oldest_session: Option<TimeMs>,
}

/// Process-wide session store, shared through the application state.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    ttl_ms: i64,
    activity_interval_ms: i64,
}

/// Tokens are only ever logged by prefix.
fn short(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl SessionManager {
    pub fn new(ttl: Duration, activity_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl_ms: ttl.as_millis() as i64,
            activity_interval_ms: activity_interval.as_millis() as i64,
        }
    }

    fn is_expired(&self, session: &Session, now: TimeMs) -> bool {
        now.since(session.login_time) > self.ttl_ms
    }

    /// Open a session for `wallet` and return its token.
    pub async fn create_session(&self, wallet: WalletAddress, is_admin: bool) -> String {
        self.create_session_at(wallet, is_admin, TimeMs::now()).await
    }

    pub async fn create_session_at(
        &self,
        wallet: WalletAddress,
        is_admin: bool,
        now: TimeMs,
    ) -> String {
        let token = generate_token();
        info!(
            "Session created for {} ({}..., admin={})",
            wallet,
            short(&token),
            is_admin
        );
        let session = Session {
            wallet_address: wallet,
            is_admin,
            login_time: now,
            last_activity: now,
            token: token.clone(),
        };
        self.sessions.write().await.insert(token.clone(), session);
        token
    }

    /// Look up a live session. Expired sessions are removed and reported as
    /// absent.
    pub async fn validate_session(&self, token: &str) -> Option<Session> {
        self.validate_session_at(token, TimeMs::now()).await
    }

    pub async fn validate_session_at(&self, token: &str, now: TimeMs) -> Option<Session> {
        if token.is_empty() {
            return None;
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(token)?;

        if self.is_expired(session, now) {
            info!(
                "Session expired for {} ({}...)",
                session.wallet_address,
                short(token)
            );
            sessions.remove(token);
            return None;
        }

        if now.since(session.last_activity) > self.activity_interval_ms {
            session.last_activity = now;
        }
        Some(session.clone())
    }

    /// Restart the TTL of an existing session. Returns false for unknown
    /// tokens.
    pub async fn renew_session(&self, token: &str) -> bool {
        self.renew_session_at(token, TimeMs::now()).await
    }

    pub async fn renew_session_at(&self, token: &str, now: TimeMs) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(token) {
            Some(session) => {
                session.login_time = now;
                session.last_activity = now;
                info!(
                    "Session renewed for {} ({}...)",
                    session.wallet_address,
                    short(token)
                );
                true
            }
            None => false,
        }
    }

    /// Remove a session. Returns false for unknown tokens.
    pub async fn destroy_session(&self, token: &str) -> bool {
        match self.sessions.write().await.remove(token) {
            Some(session) => {
                info!(
                    "Session destroyed for {} ({}...)",
                    session.wallet_address,
                    short(token)
                );
                true
            }
            None => false,
        }
    }

    /// First live session held by `wallet`.
    pub async fn session_by_wallet(&self, wallet: &WalletAddress) -> Option<Session> {
        self.session_by_wallet_at(wallet, TimeMs::now()).await
    }

    pub async fn session_by_wallet_at(
        &self,
        wallet: &WalletAddress,
        now: TimeMs,
    ) -> Option<Session> {
        let token = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .find(|s| &s.wallet_address == wallet)
                .map(|s| s.token.clone())?
        };
        self.validate_session_at(&token, now).await
    }

    pub async fn stats(&self) -> SessionStats {
        self.stats_at(TimeMs::now()).await
    }

    pub async fn stats_at(&self, now: TimeMs) -> SessionStats {
        let sessions = self.sessions.read().await;
        SessionStats {
            total_sessions: sessions.len(),
            admin_sessions: sessions.values().filter(|s| s.is_admin).count(),
            recent_sessions: sessions
                .values()
                .filter(|s| now.since(s.last_activity) < RECENT_ACTIVITY_MS)
                .count(),
            oldest_session: sessions.values().map(|s| s.login_time).min(),
        }
    }

    /// Drop every expired session and return how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(TimeMs::now()).await
    }

    pub async fn sweep_expired_at(&self, now: TimeMs) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s, now));
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Session sweep removed {} expired sessions", removed);
        } else {
            debug!("Session sweep found nothing to remove");
        }
        removed
    }

    /// Run [`Self::sweep_expired`] every `every` until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const MIN_MS: i64 = 60 * 1000;

    fn manager() -> SessionManager {
        SessionManager::new(
            Duration::from_secs(7 * 24 * 3600),
            Duration::from_secs(5 * 60),
        )
    }

    fn wallet(n: u8) -> WalletAddress {
        WalletAddress::from_str(&format!("0x{}", format!("{:02x}", n).repeat(20))).unwrap()
    }

    #[tokio::test]
    async fn test_token_is_32_bytes_hex() {
        let m = manager();
        let token = m.create_session_at(wallet(1), false, TimeMs::new(0)).await;
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let other = m.create_session_at(wallet(1), false, TimeMs::new(0)).await;
        assert_ne!(token, other);
    }

    #[tokio::test]
    async fn test_validate_within_ttl() {
        let m = manager();
        let token = m.create_session_at(wallet(1), true, TimeMs::new(0)).await;

        let session = m
            .validate_session_at(&token, TimeMs::new(7 * DAY_MS))
            .await
            .expect("exactly 7 days is still valid");
        assert_eq!(session.wallet_address, wallet(1));
        assert!(session.is_admin);
    }

    #[tokio::test]
    async fn test_validate_expired_removes_session() {
        let m = manager();
        let token = m.create_session_at(wallet(1), false, TimeMs::new(0)).await;

        assert!(m
            .validate_session_at(&token, TimeMs::new(7 * DAY_MS + 1))
            .await
            .is_none());
        assert_eq!(m.stats_at(TimeMs::new(0)).await.total_sessions, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_tokens() {
        let m = manager();
        assert!(m.validate_session_at("", TimeMs::new(0)).await.is_none());
        assert!(m.validate_session_at("nope", TimeMs::new(0)).await.is_none());
        assert!(!m.renew_session_at("nope", TimeMs::new(0)).await);
        assert!(!m.destroy_session("nope").await);
    }

    #[tokio::test]
    async fn test_activity_updates_at_most_every_interval() {
        let m = manager();
        let token = m.create_session_at(wallet(1), false, TimeMs::new(0)).await;

        let s = m
            .validate_session_at(&token, TimeMs::new(4 * MIN_MS))
            .await
            .unwrap();
        assert_eq!(s.last_activity, TimeMs::new(0));

        let s = m
            .validate_session_at(&token, TimeMs::new(6 * MIN_MS))
            .await
            .unwrap();
        assert_eq!(s.last_activity, TimeMs::new(6 * MIN_MS));
    }

    #[tokio::test]
    async fn test_renew_extends_lifetime() {
        let m = manager();
        let token = m.create_session_at(wallet(1), false, TimeMs::new(0)).await;

        assert!(m.renew_session_at(&token, TimeMs::new(6 * DAY_MS)).await);
        let s = m
            .validate_session_at(&token, TimeMs::new(12 * DAY_MS))
            .await
            .expect("renewed session still valid");
        assert_eq!(s.login_time, TimeMs::new(6 * DAY_MS));
    }

    #[tokio::test]
    async fn test_destroy_session() {
        let m = manager();
        let token = m.create_session_at(wallet(1), false, TimeMs::new(0)).await;
        assert!(m.destroy_session(&token).await);
        assert!(m.validate_session_at(&token, TimeMs::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_session_by_wallet() {
        let m = manager();
        m.create_session_at(wallet(1), false, TimeMs::new(0)).await;

        assert!(m
            .session_by_wallet_at(&wallet(1), TimeMs::new(1))
            .await
            .is_some());
        assert!(m
            .session_by_wallet_at(&wallet(2), TimeMs::new(1))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_stats_and_sweep() {
        let m = manager();
        m.create_session_at(wallet(1), true, TimeMs::new(0)).await;
        m.create_session_at(wallet(2), false, TimeMs::new(2 * DAY_MS)).await;

        let stats = m.stats_at(TimeMs::new(2 * DAY_MS + MIN_MS)).await;
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.admin_sessions, 1);
        assert_eq!(stats.recent_sessions, 1);
        assert_eq!(stats.oldest_session, Some(TimeMs::new(0)));

        assert_eq!(m.sweep_expired_at(TimeMs::new(8 * DAY_MS)).await, 1);
        let stats = m.stats_at(TimeMs::new(8 * DAY_MS)).await;
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.admin_sessions, 0);
    }
}
