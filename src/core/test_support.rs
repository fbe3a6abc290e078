// In-memory ports for the core tests.

use crate::core::lockdown::{GuildSnapshots, SnapshotStore, SnapshotStoreError};
use crate::core::moderation::{ModLogEntry, NewWarning, Warning, WarningStore, WarningStoreError};
use crate::core::platform::{
    ChannelInfo, ChannelKind, GuildPlatform, MemberInfo, PermissionOverwrite, PlatformError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Mutating calls that reached the fake platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    DeleteMessage {
        channel_id: u64,
        message_id: u64,
    },
    Timeout {
        user_id: u64,
    },
    Kick {
        user_id: u64,
    },
    Ban {
        user_id: u64,
    },
    Unban {
        user_id: u64,
    },
    Purge {
        channel_id: u64,
        limit: u8,
    },
    AddRole {
        user_id: u64,
        role_id: u64,
    },
    RemoveRole {
        user_id: u64,
        role_id: u64,
    },
    SetOverwrite {
        channel_id: u64,
        role_id: u64,
        overwrite: Option<PermissionOverwrite>,
    },
    DeleteInvite {
        code: String,
    },
}

#[derive(Default)]
pub struct FakePlatform {
    channels: Mutex<Vec<ChannelInfo>>,
    members: Mutex<Vec<MemberInfo>>,
    invites: Mutex<Vec<String>>,
    channel_messages: Mutex<HashMap<u64, usize>>,
    calls: Mutex<Vec<PlatformCall>>,
    logs: Mutex<Vec<(u64, ModLogEntry)>>,
    fail_channels: Mutex<HashSet<u64>>,
    forbidden_users: Mutex<HashSet<u64>>,
    missing_users: Mutex<HashSet<u64>>,
    rate_limits: AtomicU32,
    unreachable: AtomicBool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(
        &self,
        id: u64,
        kind: ChannelKind,
        role_id: u64,
        overwrite: Option<PermissionOverwrite>,
    ) {
        let mut overwrites = HashMap::new();
        if let Some(ow) = overwrite {
            overwrites.insert(role_id, ow);
        }
        self.channels.lock().unwrap().push(ChannelInfo {
            id,
            name: format!("channel-{}", id),
            kind,
            overwrites,
        });
    }

    pub fn remove_channel(&self, id: u64) {
        self.channels.lock().unwrap().retain(|c| c.id != id);
    }

    pub fn overwrite(&self, channel_id: u64, role_id: u64) -> Option<PermissionOverwrite> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == channel_id)
            .and_then(|c| c.overwrites.get(&role_id).copied())
    }

    /// Overwrite edits on this channel fail with Forbidden until healed.
    pub fn fail_channel(&self, id: u64) {
        self.fail_channels.lock().unwrap().insert(id);
    }

    pub fn heal_channel(&self, id: u64) {
        self.fail_channels.lock().unwrap().remove(&id);
    }

    pub fn set_channel_messages(&self, channel_id: u64, count: usize) {
        self.channel_messages
            .lock()
            .unwrap()
            .insert(channel_id, count);
    }

    pub fn add_member(&self, user_id: u64, roles: Vec<u64>, bot: bool) {
        self.members
            .lock()
            .unwrap()
            .push(MemberInfo { user_id, roles, bot });
    }

    pub fn member_roles(&self, user_id: u64) -> Vec<u64> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.roles.clone())
            .unwrap_or_default()
    }

    pub fn add_invite(&self, code: &str) {
        self.invites.lock().unwrap().push(code.to_string());
    }

    pub fn invites(&self) -> Vec<String> {
        self.invites.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<(u64, ModLogEntry)> {
        self.logs.lock().unwrap().clone()
    }

    pub fn mark_missing_user(&self, user_id: u64) {
        self.missing_users.lock().unwrap().insert(user_id);
    }

    /// Member actions on this user fail with Forbidden.
    pub fn forbid_user(&self, user_id: u64) {
        self.forbidden_users.lock().unwrap().insert(user_id);
    }

    /// The next `n` calls answer RateLimited.
    pub fn rate_limit_next(&self, n: u32) {
        self.rate_limits.store(n, Ordering::SeqCst);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<(), PlatformError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("connection refused".into()));
        }
        let limited = self
            .rate_limits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(PlatformError::RateLimited { retry_after: None });
        }
        Ok(())
    }

    fn check_user(&self, user_id: u64) -> Result<(), PlatformError> {
        self.gate()?;
        if self.missing_users.lock().unwrap().contains(&user_id) {
            return Err(PlatformError::NotFound(format!("user {}", user_id)));
        }
        if self.forbidden_users.lock().unwrap().contains(&user_id) {
            return Err(PlatformError::Forbidden("role hierarchy".into()));
        }
        Ok(())
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GuildPlatform for FakePlatform {
    async fn delete_message(
        &self,
        _guild_id: u64,
        channel_id: u64,
        message_id: u64,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.gate()?;
        self.record(PlatformCall::DeleteMessage {
            channel_id,
            message_id,
        });
        Ok(())
    }

    async fn timeout_member(
        &self,
        _guild_id: u64,
        user_id: u64,
        _until: DateTime<Utc>,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.check_user(user_id)?;
        self.record(PlatformCall::Timeout { user_id });
        Ok(())
    }

    async fn kick_member(
        &self,
        _guild_id: u64,
        user_id: u64,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.check_user(user_id)?;
        self.record(PlatformCall::Kick { user_id });
        Ok(())
    }

    async fn ban_member(
        &self,
        _guild_id: u64,
        user_id: u64,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.check_user(user_id)?;
        self.record(PlatformCall::Ban { user_id });
        Ok(())
    }

    async fn unban_member(
        &self,
        _guild_id: u64,
        user_id: u64,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.check_user(user_id)?;
        self.record(PlatformCall::Unban { user_id });
        Ok(())
    }

    async fn purge_messages(
        &self,
        _guild_id: u64,
        channel_id: u64,
        limit: u8,
    ) -> Result<usize, PlatformError> {
        self.gate()?;
        let mut messages = self.channel_messages.lock().unwrap();
        let available = messages.entry(channel_id).or_insert(0);
        let removed = (*available).min(limit as usize);
        *available -= removed;
        drop(messages);
        self.record(PlatformCall::Purge { channel_id, limit });
        Ok(removed)
    }

    async fn add_role(
        &self,
        _guild_id: u64,
        user_id: u64,
        role_id: u64,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.check_user(user_id)?;
        let mut members = self.members.lock().unwrap();
        let member = members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| PlatformError::NotFound(format!("member {}", user_id)))?;
        if !member.roles.contains(&role_id) {
            member.roles.push(role_id);
        }
        drop(members);
        self.record(PlatformCall::AddRole { user_id, role_id });
        Ok(())
    }

    async fn remove_role(
        &self,
        _guild_id: u64,
        user_id: u64,
        role_id: u64,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.check_user(user_id)?;
        let mut members = self.members.lock().unwrap();
        let member = members
            .iter_mut()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| PlatformError::NotFound(format!("member {}", user_id)))?;
        member.roles.retain(|r| *r != role_id);
        drop(members);
        self.record(PlatformCall::RemoveRole { user_id, role_id });
        Ok(())
    }

    async fn list_members(&self, _guild_id: u64) -> Result<Vec<MemberInfo>, PlatformError> {
        self.gate()?;
        Ok(self.members.lock().unwrap().clone())
    }

    async fn list_channels(&self, _guild_id: u64) -> Result<Vec<ChannelInfo>, PlatformError> {
        self.gate()?;
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn set_channel_overwrite(
        &self,
        _guild_id: u64,
        channel_id: u64,
        role_id: u64,
        overwrite: Option<PermissionOverwrite>,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.gate()?;
        if self.fail_channels.lock().unwrap().contains(&channel_id) {
            return Err(PlatformError::Forbidden(format!("channel {}", channel_id)));
        }
        let mut channels = self.channels.lock().unwrap();
        let channel = channels
            .iter_mut()
            .find(|c| c.id == channel_id)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {}", channel_id)))?;
        match overwrite {
            Some(ow) => {
                channel.overwrites.insert(role_id, ow);
            }
            None => {
                channel.overwrites.remove(&role_id);
            }
        }
        drop(channels);
        self.record(PlatformCall::SetOverwrite {
            channel_id,
            role_id,
            overwrite,
        });
        Ok(())
    }

    async fn list_invites(&self, _guild_id: u64) -> Result<Vec<String>, PlatformError> {
        self.gate()?;
        Ok(self.invites())
    }

    async fn delete_invite(
        &self,
        _guild_id: u64,
        code: &str,
        _reason: &str,
    ) -> Result<(), PlatformError> {
        self.gate()?;
        let mut invites = self.invites.lock().unwrap();
        let before = invites.len();
        invites.retain(|c| c != code);
        if invites.len() == before {
            return Err(PlatformError::NotFound(format!("invite {}", code)));
        }
        drop(invites);
        self.record(PlatformCall::DeleteInvite {
            code: code.to_string(),
        });
        Ok(())
    }

    async fn send_log(
        &self,
        _guild_id: u64,
        channel_id: u64,
        entry: &ModLogEntry,
    ) -> Result<(), PlatformError> {
        self.gate()?;
        self.logs.lock().unwrap().push((channel_id, entry.clone()));
        Ok(())
    }
}

// ============================================================================
// STORES
// ============================================================================

#[derive(Default)]
pub struct MemoryWarningStore {
    rows: Mutex<Vec<Warning>>,
    next_id: AtomicI64,
    unreachable: AtomicBool,
}

impl MemoryWarningStore {
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<(), WarningStoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(WarningStoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WarningStore for MemoryWarningStore {
    async fn insert(&self, warning: NewWarning) -> Result<Warning, WarningStoreError> {
        self.gate()?;
        let stored = Warning {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: warning.user_id,
            moderator_id: warning.moderator_id,
            reason: warning.reason,
            created_at: warning.created_at,
        };
        self.rows.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn query(&self, user_id: u64) -> Result<Vec<Warning>, WarningStoreError> {
        self.gate()?;
        let mut rows: Vec<Warning> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_all(&self, user_id: u64) -> Result<u64, WarningStoreError> {
        self.gate()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|w| w.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }
}

/// Clones share the same backing map, which is how the tests model a restart.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    docs: Arc<DashMap<u64, GuildSnapshots>>,
}

impl MemorySnapshotStore {
    pub fn snapshot(&self, guild_id: u64) -> GuildSnapshots {
        self.docs
            .get(&guild_id)
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, guild_id: u64) -> Result<GuildSnapshots, SnapshotStoreError> {
        Ok(self.snapshot(guild_id))
    }

    async fn save(
        &self,
        guild_id: u64,
        snapshots: &GuildSnapshots,
    ) -> Result<(), SnapshotStoreError> {
        self.docs.insert(guild_id, snapshots.clone());
        Ok(())
    }
}
