// Platform port - everything the bot asks of the chat platform.
//
// The core layer only sees these plain types. The Discord layer implements
// `GuildPlatform` on top of serenity's HTTP client, and the tests use an
// in-memory fake.

use crate::core::moderation::ModLogEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Raw permission bits used by the lockdown overlays.
/// Values match the platform's permission bitfield.
pub mod permission_bits {
    pub const CREATE_INSTANT_INVITE: u64 = 1 << 0;
    pub const SEND_MESSAGES: u64 = 1 << 11;
    pub const CONNECT: u64 = 1 << 20;
    pub const SPEAK: u64 = 1 << 21;
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("missing permission ({0})")]
    Forbidden(String),

    #[error("not found ({0})")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("platform unavailable ({0})")]
    Unavailable(String),
}

// ============================================================================
// PLATFORM TYPES
// ============================================================================

/// A role-scoped permission overwrite on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub allow: u64,
    pub deny: u64,
}

impl PermissionOverwrite {
    /// Same overwrite with `bits` moved to the deny side.
    pub fn denying(self, bits: u64) -> Self {
        Self {
            allow: self.allow & !bits,
            deny: self.deny | bits,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Other,
}

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: u64,
    pub name: String,
    pub kind: ChannelKind,
    /// Role id -> overwrite. Member-scoped overwrites are not tracked.
    pub overwrites: HashMap<u64, PermissionOverwrite>,
}

#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub user_id: u64,
    pub roles: Vec<u64>,
    pub bot: bool,
}

// ============================================================================
// PORT
// ============================================================================

/// Every call may fail with NotFound, Forbidden or RateLimited.
#[async_trait]
pub trait GuildPlatform: Send + Sync {
    async fn delete_message(
        &self,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn kick_member(&self, guild_id: u64, user_id: u64, reason: &str)
        -> Result<(), PlatformError>;

    async fn ban_member(&self, guild_id: u64, user_id: u64, reason: &str)
        -> Result<(), PlatformError>;

    async fn unban_member(&self, guild_id: u64, user_id: u64, reason: &str)
        -> Result<(), PlatformError>;

    /// Delete the most recent `limit` messages. Returns how many were removed.
    async fn purge_messages(
        &self,
        guild_id: u64,
        channel_id: u64,
        limit: u8,
    ) -> Result<usize, PlatformError>;

    async fn add_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn list_members(&self, guild_id: u64) -> Result<Vec<MemberInfo>, PlatformError>;

    async fn list_channels(&self, guild_id: u64) -> Result<Vec<ChannelInfo>, PlatformError>;

    /// `None` removes the role's overwrite from the channel entirely.
    async fn set_channel_overwrite(
        &self,
        guild_id: u64,
        channel_id: u64,
        role_id: u64,
        overwrite: Option<PermissionOverwrite>,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn list_invites(&self, guild_id: u64) -> Result<Vec<String>, PlatformError>;

    async fn delete_invite(&self, guild_id: u64, code: &str, reason: &str)
        -> Result<(), PlatformError>;

    async fn send_log(
        &self,
        guild_id: u64,
        channel_id: u64,
        entry: &ModLogEntry,
    ) -> Result<(), PlatformError>;
}

// ============================================================================
// CALL POLICY
// ============================================================================

/// Bounds every platform call and retries a rate-limited call exactly once.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub default_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            default_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl CallPolicy {
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        match self.bounded(call()).await {
            Err(PlatformError::RateLimited { retry_after }) => {
                let delay = self.backoff(retry_after);
                tracing::warn!(?delay, "Platform rate limit hit, retrying once");
                tokio::time::sleep(delay).await;
                self.bounded(call()).await
            }
            other => other,
        }
    }

    async fn bounded<T, Fut>(&self, call: Fut) -> Result<T, PlatformError>
    where
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(PlatformError::Timeout(self.timeout)))
    }

    fn backoff(&self, hint: Option<Duration>) -> Duration {
        let base = hint.unwrap_or(self.default_backoff).min(self.max_backoff);
        // Up to 10% jitter so simultaneous retries don't line up.
        let spread = (base.as_millis() as u64) / 10;
        let jitter = rand::thread_rng().gen_range(0..=spread);
        (base + Duration::from_millis(jitter)).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(200),
            default_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_denying_moves_bits_to_deny_side() {
        let ow = PermissionOverwrite {
            allow: permission_bits::SEND_MESSAGES | permission_bits::CONNECT,
            deny: 0,
        };
        let locked = ow.denying(permission_bits::SEND_MESSAGES);
        assert_eq!(locked.allow, permission_bits::CONNECT);
        assert_eq!(locked.deny, permission_bits::SEND_MESSAGES);
    }

    #[tokio::test]
    async fn test_rate_limited_call_is_retried_once() {
        let attempts = &AtomicU32::new(0);
        let result = fast_policy()
            .run(|| async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(PlatformError::RateLimited { retry_after: None })
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_rate_limit_is_reported() {
        let attempts = &AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .run(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::RateLimited { retry_after: None })
            })
            .await;

        assert!(matches!(result, Err(PlatformError::RateLimited { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let attempts = &AtomicU32::new(0);
        let result: Result<(), _> = fast_policy()
            .run(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::Forbidden("role hierarchy".into()))
            })
            .await;

        assert!(matches!(result, Err(PlatformError::Forbidden(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let result: Result<(), _> = fast_policy()
            .run(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(PlatformError::Timeout(_))));
    }

    #[test]
    fn test_backoff_respects_cap() {
        let policy = fast_policy();
        let delay = policy.backoff(Some(Duration::from_secs(30)));
        assert!(delay <= policy.max_backoff);
    }
}
