// Permission snapshots - what a lockdown or invite pause changed, and how to
// put it back.

use crate::core::moderation::Actor;
use crate::core::platform::{permission_bits, ChannelInfo, ChannelKind, PermissionOverwrite};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Snapshot store error: {0}")]
pub struct SnapshotStoreError(pub String);

/// One (channel, role) overwrite as it was before the overlay went on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub channel_id: u64,
    pub role_id: u64,
    /// `None` when the role had no overwrite on the channel.
    pub prior: Option<PermissionOverwrite>,
    /// Bits the overlay denied on this channel.
    pub bits: u64,
}

impl SnapshotEntry {
    /// Overwrite to write back, given what the channel holds now.
    ///
    /// Only the overlay's bits are reverted. Anything else changed on the
    /// channel in the meantime is kept, so two overlays on the same channel
    /// can be lifted in any order. With no other changes the result equals
    /// `prior` exactly.
    pub fn restored(&self, current: Option<PermissionOverwrite>) -> Option<PermissionOverwrite> {
        let current = current.unwrap_or_default();
        let prior = self.prior.unwrap_or_default();
        let merged = PermissionOverwrite {
            allow: (current.allow & !self.bits) | (prior.allow & self.bits),
            deny: (current.deny & !self.bits) | (prior.deny & self.bits),
        };

        if self.prior.is_none() && merged == PermissionOverwrite::default() {
            None
        } else {
            Some(merged)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteSnapshot {
    pub reason: String,
    pub actor: Actor,
    pub taken_at: DateTime<Utc>,
    /// In the order the overlay was applied.
    pub entries: Vec<SnapshotEntry>,
}

/// Everything the lockdown service has to remember for one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSnapshots {
    #[serde(default)]
    pub lockdown: Option<OverwriteSnapshot>,
    #[serde(default)]
    pub invite_pause: Option<OverwriteSnapshot>,
}

impl GuildSnapshots {
    pub fn is_empty(&self) -> bool {
        self.lockdown.is_none() && self.invite_pause.is_none()
    }
}

/// Durable copy of the active snapshots, so a restart between lockdown and
/// unlock can still restore.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, guild_id: u64) -> Result<GuildSnapshots, SnapshotStoreError>;
    async fn save(&self, guild_id: u64, snapshots: &GuildSnapshots)
        -> Result<(), SnapshotStoreError>;
}

// ============================================================================
// OVERLAYS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    /// Stop members talking: no sending in text, no joining or speaking in voice.
    Lockdown,
    /// Stop members creating invites.
    InvitePause,
}

impl Overlay {
    /// Bits to deny on a channel of this kind, `None` to leave it alone.
    pub fn deny_bits(self, kind: ChannelKind) -> Option<u64> {
        match (self, kind) {
            (Overlay::Lockdown, ChannelKind::Text) => Some(permission_bits::SEND_MESSAGES),
            (Overlay::Lockdown, ChannelKind::Voice) => {
                Some(permission_bits::CONNECT | permission_bits::SPEAK)
            }
            (Overlay::Lockdown, _) => None,
            (Overlay::InvitePause, ChannelKind::Other) => None,
            (Overlay::InvitePause, _) => Some(permission_bits::CREATE_INSTANT_INVITE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    pub channel_id: u64,
    pub role_id: u64,
    pub prior: Option<PermissionOverwrite>,
    pub next: PermissionOverwrite,
    pub bits: u64,
}

impl PlannedEdit {
    pub fn entry(&self) -> SnapshotEntry {
        SnapshotEntry {
            channel_id: self.channel_id,
            role_id: self.role_id,
            prior: self.prior,
            bits: self.bits,
        }
    }
}

/// Every edit an overlay needs, one per (channel, baseline role).
pub fn plan_overlay(
    channels: &[ChannelInfo],
    baseline_roles: &[u64],
    overlay: Overlay,
) -> Vec<PlannedEdit> {
    let mut edits = Vec::new();
    for channel in channels {
        let Some(bits) = overlay.deny_bits(channel.kind) else {
            continue;
        };
        for &role_id in baseline_roles {
            let prior = channel.overwrites.get(&role_id).copied();
            edits.push(PlannedEdit {
                channel_id: channel.id,
                role_id,
                prior,
                next: prior.unwrap_or_default().denying(bits),
                bits,
            });
        }
    }
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn channel(id: u64, kind: ChannelKind, everyone: Option<PermissionOverwrite>) -> ChannelInfo {
        let mut overwrites = HashMap::new();
        if let Some(ow) = everyone {
            overwrites.insert(1, ow);
        }
        ChannelInfo {
            id,
            name: format!("channel-{}", id),
            kind,
            overwrites,
        }
    }

    #[test]
    fn test_plan_skips_categories_for_lockdown() {
        let channels = vec![
            channel(10, ChannelKind::Text, None),
            channel(11, ChannelKind::Voice, None),
            channel(12, ChannelKind::Category, None),
        ];
        let plan = plan_overlay(&channels, &[1], Overlay::Lockdown);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].next.deny, permission_bits::SEND_MESSAGES);
        assert_eq!(
            plan[1].next.deny,
            permission_bits::CONNECT | permission_bits::SPEAK
        );
    }

    #[test]
    fn test_plan_keeps_existing_bits() {
        let prior = PermissionOverwrite {
            allow: permission_bits::SEND_MESSAGES | permission_bits::CREATE_INSTANT_INVITE,
            deny: permission_bits::SPEAK,
        };
        let plan = plan_overlay(
            &[channel(10, ChannelKind::Text, Some(prior))],
            &[1],
            Overlay::Lockdown,
        );

        assert_eq!(plan[0].prior, Some(prior));
        assert_eq!(plan[0].next.allow, permission_bits::CREATE_INSTANT_INVITE);
        assert_eq!(
            plan[0].next.deny,
            permission_bits::SPEAK | permission_bits::SEND_MESSAGES
        );
    }

    #[test]
    fn test_restore_without_interference_is_exact() {
        for prior in [
            None,
            Some(PermissionOverwrite::default()),
            Some(PermissionOverwrite {
                allow: permission_bits::SEND_MESSAGES,
                deny: permission_bits::CONNECT,
            }),
        ] {
            let edit = &plan_overlay(
                &[channel(10, ChannelKind::Text, prior)],
                &[1],
                Overlay::Lockdown,
            )[0];
            assert_eq!(edit.entry().restored(Some(edit.next)), prior);
        }
    }

    #[test]
    fn test_overlays_lift_in_any_order() {
        let prior = Some(PermissionOverwrite {
            allow: permission_bits::SEND_MESSAGES,
            deny: 0,
        });
        let lock = plan_overlay(&[channel(10, ChannelKind::Text, prior)], &[1], Overlay::Lockdown)
            .remove(0);
        let pause = plan_overlay(
            &[channel(10, ChannelKind::Text, Some(lock.next))],
            &[1],
            Overlay::InvitePause,
        )
        .remove(0);

        // Lift the lockdown first while invites are still paused.
        let after_unlock = lock.entry().restored(Some(pause.next));
        let after_resume = pause.entry().restored(after_unlock);

        assert_eq!(
            after_unlock.map(|o| o.deny),
            Some(permission_bits::CREATE_INSTANT_INVITE)
        );
        assert_eq!(after_resume, prior);
    }
}
