// Security service - feeds incoming events through the classifiers and hands
// the planned response to the action executor.

use super::classifiers::{inspect_join, inspect_message, plan_response};
use super::security_models::{JoinPlan, MemberJoinEvent, MessageEvent, MessageVerdict};
use crate::core::config::{BotConfig, SettingsService, SettingsStore};
use crate::core::moderation::{ActionError, ActionExecutor, ActionRecord, Actor};
use crate::core::platform::GuildPlatform;
use std::sync::Arc;

#[derive(Debug)]
pub struct MessageOutcome {
    pub verdict: MessageVerdict,
    pub results: Vec<Result<ActionRecord, ActionError>>,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub plan: JoinPlan,
    pub results: Vec<Result<ActionRecord, ActionError>>,
}

pub struct SecurityService<P: GuildPlatform, S: SettingsStore> {
    config: Arc<BotConfig>,
    settings: Arc<SettingsService<S>>,
    executor: Arc<ActionExecutor<P>>,
}

impl<P: GuildPlatform, S: SettingsStore> SecurityService<P, S> {
    pub fn new(
        config: Arc<BotConfig>,
        settings: Arc<SettingsService<S>>,
        executor: Arc<ActionExecutor<P>>,
    ) -> Self {
        Self {
            config,
            settings,
            executor,
        }
    }

    /// Classify a message and carry out the response, if any.
    pub async fn on_message(&self, event: &MessageEvent) -> MessageOutcome {
        let settings = self.settings.current(event.guild_id).await;
        let verdict = inspect_message(&self.config, &settings, event);
        if verdict.is_clean() {
            return MessageOutcome {
                verdict,
                results: Vec::new(),
            };
        }

        let actions = plan_response(event, &verdict);
        tracing::info!(
            guild_id = event.guild_id,
            user_id = event.author_id,
            violations = verdict.violations.len(),
            actions = actions.len(),
            "Message flagged by security filters"
        );

        let results = self
            .executor
            .execute_all(
                event.guild_id,
                Actor::Bot,
                actions,
                Some(verdict.evidence_summary()),
            )
            .await;
        log_failures(event.guild_id, &results);

        MessageOutcome { verdict, results }
    }

    pub async fn on_member_join(&self, event: &MemberJoinEvent) -> JoinOutcome {
        let settings = self.settings.current(event.guild_id).await;
        let plan = inspect_join(&self.config, &settings, event);
        if plan.actions.is_empty() {
            return JoinOutcome {
                plan,
                results: Vec::new(),
            };
        }

        let evidence = plan.underage.as_ref().map(|v| v.evidence.to_string());
        let results = self
            .executor
            .execute_all(event.guild_id, Actor::Bot, plan.actions.clone(), evidence)
            .await;
        log_failures(event.guild_id, &results);

        JoinOutcome { plan, results }
    }
}

fn log_failures(guild_id: u64, results: &[Result<ActionRecord, ActionError>]) {
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        tracing::warn!(guild_id, error = %err, "Automated security action failed");
    }
}
