//! Reminder sweep — nudges members who still hold the placeholder role and
//! restarts their onboarding.

use std::sync::Arc;

use crate::platform::Member;

use super::prompts;
use super::workflow::OnboardingWorkflow;

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Non-bot members holding the placeholder role.
    pub candidates: usize,
    pub prompted: usize,
    pub started: usize,
    /// Skipped because a conversation was already running.
    pub already_active: usize,
    pub failed: usize,
}

pub struct ReminderSweep {
    workflow: Arc<OnboardingWorkflow>,
}

impl ReminderSweep {
    pub fn new(workflow: Arc<OnboardingWorkflow>) -> Self {
        Self { workflow }
    }

    /// Run one sweep. Problems with a single member are logged and the
    /// sweep moves on.
    pub async fn run(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let guild = self.workflow.guild();
        let config = self.workflow.config();

        let placeholder = match guild.find_role_by_name(&config.placeholder_role).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                tracing::warn!(
                    role = %config.placeholder_role,
                    "Placeholder role not found, skipping sweep"
                );
                return summary;
            }
            Err(e) => {
                tracing::error!(error = %e, "Role lookup failed, skipping sweep");
                return summary;
            }
        };

        let channel = match guild.find_channel_by_name(&config.onboarding_channel).await {
            Ok(Some(channel)) if channel.is_conversational() => channel,
            Ok(_) => {
                tracing::warn!(
                    channel = %config.onboarding_channel,
                    "Onboarding channel unavailable, skipping sweep"
                );
                return summary;
            }
            Err(e) => {
                tracing::error!(error = %e, "Channel lookup failed, skipping sweep");
                return summary;
            }
        };

        let members = match guild.fetch_all_members().await {
            Ok(members) => members,
            Err(e) => {
                tracing::error!(error = %e, "Could not fetch members, skipping sweep");
                return summary;
            }
        };

        let candidates: Vec<Member> = members
            .into_iter()
            .filter(|m| !m.bot && m.has_role(placeholder.id))
            .collect();
        summary.candidates = candidates.len();
        if candidates.is_empty() {
            tracing::info!("No members waiting on onboarding");
            return summary;
        }

        if let Err(e) = guild.send_message(channel.id, prompts::REMINDER_HEADER).await {
            tracing::warn!(error = %e, "Could not post reminder header");
        }

        for member in &candidates {
            if self.workflow.is_active(member.id) {
                summary.already_active += 1;
                continue;
            }
            if let Err(e) = guild
                .send_message(channel.id, &prompts::reminder(member.id))
                .await
            {
                tracing::warn!(member = %member.id, error = %e, "Could not send reminder");
                summary.failed += 1;
                continue;
            }
            summary.prompted += 1;
            match self.workflow.spawn(member.id, channel.id) {
                Some(_) => summary.started += 1,
                None => summary.already_active += 1,
            }
        }

        tracing::info!(
            candidates = summary.candidates,
            started = summary.started,
            already_active = summary.already_active,
            failed = summary.failed,
            "Reminder sweep finished"
        );
        summary
    }
}
