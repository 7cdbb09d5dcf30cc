//! Onboarding workflow — one member's conversation from first question to
//! role assignment.
//!
//! A run walks [`ConversationState`] through its phases, asking each question
//! through the [`ResponseCollector`]. Validation problems abort the run with
//! no side effects. Once the answers are valid the side effects are applied
//! in a fixed order; the first platform error stops the run and the member is
//! told something went wrong. The member's [`ActiveGuard`] is held for the
//! whole run and released however it ends.
//!
//! Class roles are created under a workflow-wide lock, so runs finishing at
//! the same time with the same year end up sharing one role.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::OnboardingConfig;
use crate::error::Result;
use crate::platform::{ChannelId, Guild, MemberId, Role};

use super::classifier::classify_with_cutoff;
use super::collector::ResponseCollector;
use super::model::{AbortReason, OnboardingResult, StatusLabel, WorkflowOutcome};
use super::prompts;
use super::registry::{ActiveGuard, ActiveMembers};
use super::state::ConversationState;

/// Source of "today" for status classification.
pub type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Today's date in `tz`.
pub fn today_in(tz: Tz) -> Today {
    Arc::new(move || Utc::now().with_timezone(&tz).date_naive())
}

pub struct OnboardingWorkflow {
    guild: Arc<dyn Guild>,
    collector: Arc<ResponseCollector>,
    active: Arc<ActiveMembers>,
    config: OnboardingConfig,
    today: Today,
    role_creation: Mutex<()>,
}

impl OnboardingWorkflow {
    pub fn new(
        guild: Arc<dyn Guild>,
        collector: Arc<ResponseCollector>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            guild,
            collector,
            active: ActiveMembers::new(),
            config,
            today: Arc::new(|| Utc::now().date_naive()),
            role_creation: Mutex::new(()),
        }
    }

    /// Replace the clock used for status classification.
    pub fn with_clock(mut self, today: Today) -> Self {
        self.today = today;
        self
    }

    pub fn guild(&self) -> &Arc<dyn Guild> {
        &self.guild
    }

    pub fn collector(&self) -> &Arc<ResponseCollector> {
        &self.collector
    }

    pub fn active(&self) -> &Arc<ActiveMembers> {
        &self.active
    }

    pub fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    pub fn is_active(&self, member: MemberId) -> bool {
        self.active.contains(member)
    }

    /// Start a run in the background.
    ///
    /// The member's slot is taken before this returns, so a second call for
    /// the same member yields `None` even if the first task has not been
    /// polled yet.
    pub fn spawn(
        self: &Arc<Self>,
        member: MemberId,
        channel: ChannelId,
    ) -> Option<JoinHandle<WorkflowOutcome>> {
        let Some(guard) = self.active.try_acquire(member) else {
            tracing::debug!(%member, "Onboarding already in progress");
            return None;
        };
        let workflow = Arc::clone(self);
        Some(tokio::spawn(async move {
            workflow.run_acquired(guard, channel).await
        }))
    }

    /// Run to completion on the current task. `None` if the member is
    /// already being onboarded.
    pub async fn run(&self, member: MemberId, channel: ChannelId) -> Option<WorkflowOutcome> {
        let guard = self.active.try_acquire(member)?;
        Some(self.run_acquired(guard, channel).await)
    }

    async fn run_acquired(&self, guard: ActiveGuard, channel: ChannelId) -> WorkflowOutcome {
        let member = guard.member();
        let span = tracing::info_span!("onboarding", %member, run_id = %Uuid::new_v4());
        async move {
            tracing::info!(%channel, "Onboarding started");
            let outcome = match self.execute(member, channel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Onboarding failed");
                    if let Err(e) = self
                        .guild
                        .send_message(channel, prompts::SOMETHING_WENT_WRONG)
                        .await
                    {
                        tracing::warn!(error = %e, "Could not report failure to member");
                    }
                    WorkflowOutcome::Failed(e.to_string())
                }
            };
            drop(guard);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, member: MemberId, channel: ChannelId) -> Result<WorkflowOutcome> {
        let mut state = ConversationState::new(member);

        while let Some(question) = state.next_question() {
            let answer = self
                .collector
                .ask(state.member(), channel, question.text())
                .await?;
            if let Err(reason) = state.record_answer(answer) {
                return self.abort(channel, reason).await;
            }
        }

        let result = match state.finalize() {
            Ok(result) => result,
            Err(reason) => return self.abort(channel, reason).await,
        };

        let status = classify_with_cutoff(
            result.graduation_year,
            (self.today)(),
            self.config.status_cutoff,
        );
        self.apply(member, channel, &result, status).await?;
        state.complete();

        tracing::info!(
            nickname = %result.nickname(),
            year = result.graduation_year,
            %status,
            "Onboarding completed"
        );
        Ok(WorkflowOutcome::Completed { result, status })
    }

    async fn abort(&self, channel: ChannelId, reason: AbortReason) -> Result<WorkflowOutcome> {
        tracing::info!(%reason, "Onboarding aborted");
        self.guild
            .send_message(channel, prompts::INVALID_INPUT)
            .await?;
        Ok(WorkflowOutcome::Aborted(reason))
    }

    async fn apply(
        &self,
        member: MemberId,
        channel: ChannelId,
        result: &OnboardingResult,
        status: StatusLabel,
    ) -> Result<()> {
        let guild = &self.guild;

        guild.set_nickname(member, &result.nickname()).await?;

        let year_role = self
            .ensure_role(&result.graduation_year.to_string())
            .await?;
        guild.add_role(member, year_role.id).await?;

        let status_role = self.config.status_role(status);
        match guild.find_role_by_name(status_role).await? {
            Some(role) => guild.add_role(member, role.id).await?,
            None => tracing::warn!(role = %status_role, "Status role not found, skipping"),
        }

        match guild.find_role_by_name(&self.config.placeholder_role).await? {
            Some(role) => guild.remove_role(member, role.id).await?,
            None => tracing::warn!(
                role = %self.config.placeholder_role,
                "Placeholder role not found, nothing to remove"
            ),
        }

        let announcement_channel = &self.config.announcement_channel;
        match guild.find_channel_by_name(announcement_channel).await? {
            Some(target) if target.is_conversational() => {
                guild
                    .send_message(
                        target.id,
                        &prompts::announcement(member, result.graduation_year),
                    )
                    .await?
            }
            Some(_) => tracing::warn!(
                channel = %announcement_channel,
                "Announcement channel is not a text channel, skipping"
            ),
            None => tracing::warn!(
                channel = %announcement_channel,
                "Announcement channel not found, skipping"
            ),
        }

        guild
            .send_message(
                channel,
                &prompts::completed(&result.first_name, result.graduation_year, status_role),
            )
            .await?;
        Ok(())
    }

    /// Look up the role called `name`, creating it if it does not exist yet.
    async fn ensure_role(&self, name: &str) -> Result<Role> {
        if let Some(role) = self.guild.find_role_by_name(name).await? {
            return Ok(role);
        }
        let _creating = self.role_creation.lock().await;
        // Another run may have created it while this one waited.
        if let Some(role) = self.guild.find_role_by_name(name).await? {
            return Ok(role);
        }
        tracing::info!(role = %name, "Creating class role");
        Ok(self.guild.create_role(name, prompts::ROLE_REASON).await?)
    }
}
