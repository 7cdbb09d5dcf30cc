//! Event handler — routes platform events to the collector, the workflow
//! and the reminder sweep.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::error::PlatformError;
use crate::onboarding::{OnboardingWorkflow, ReminderSweep, SweepSummary, WorkflowOutcome, prompts};
use crate::platform::{Channel, EventSource, InboundMessage, Member, PlatformEvent};

/// What the handler did with an event.
#[derive(Debug)]
pub enum Handled {
    Ignored,
    Ready,
    /// The message answered an outstanding question.
    Answered,
    SweepTriggered(JoinHandle<SweepSummary>),
    OnboardingStarted(JoinHandle<WorkflowOutcome>),
}

pub struct OnboardingBot {
    workflow: Arc<OnboardingWorkflow>,
    sweep: Arc<ReminderSweep>,
    trigger_keyword: String,
}

impl OnboardingBot {
    pub fn new(workflow: Arc<OnboardingWorkflow>, trigger_keyword: &str) -> Self {
        let sweep = Arc::new(ReminderSweep::new(Arc::clone(&workflow)));
        Self {
            workflow,
            sweep,
            trigger_keyword: trigger_keyword.trim().to_string(),
        }
    }

    pub fn sweep(&self) -> &Arc<ReminderSweep> {
        &self.sweep
    }

    pub fn workflow(&self) -> &Arc<OnboardingWorkflow> {
        &self.workflow
    }

    fn is_trigger(&self, message: &InboundMessage) -> bool {
        message
            .content
            .trim()
            .eq_ignore_ascii_case(&self.trigger_keyword)
    }

    /// Offer a message to the collector. Bot messages and the sweep keyword
    /// never answer.
    fn try_answer(&self, message: &InboundMessage) -> bool {
        !message.author.bot
            && !self.is_trigger(message)
            && self.workflow.collector().dispatch(message)
    }

    pub async fn handle_event(&self, event: PlatformEvent) -> Handled {
        if let PlatformEvent::MessageCreated(message) = &event {
            if self.try_answer(message) {
                return Handled::Answered;
            }
        }
        self.route(event).await
    }

    /// Handle an event whose message, if any, has already been offered to
    /// the collector.
    async fn route(&self, event: PlatformEvent) -> Handled {
        match event {
            PlatformEvent::Ready { user } => {
                tracing::info!(%user, "Connected");
                Handled::Ready
            }
            PlatformEvent::MemberJoined(member) => self.on_member_joined(member).await,
            PlatformEvent::MessageCreated(message) => self.on_message(message).await,
        }
    }

    async fn onboarding_channel(&self) -> Option<Channel> {
        let name = &self.workflow.config().onboarding_channel;
        match self.workflow.guild().find_channel_by_name(name).await {
            Ok(Some(channel)) if channel.is_conversational() => Some(channel),
            Ok(_) => {
                tracing::warn!(channel = %name, "Onboarding channel unavailable");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Channel lookup failed");
                None
            }
        }
    }

    async fn on_member_joined(&self, member: Member) -> Handled {
        if member.bot {
            return Handled::Ignored;
        }
        tracing::info!(member = %member.id, name = %member.display_name, "Member joined");
        let guild = self.workflow.guild();
        let placeholder = &self.workflow.config().placeholder_role;

        match guild.find_role_by_name(placeholder).await {
            Ok(Some(role)) => {
                if let Err(e) = guild.add_role(member.id, role.id).await {
                    tracing::error!(
                        member = %member.id,
                        error = %e,
                        "Could not assign placeholder role"
                    );
                }
            }
            Ok(None) => tracing::warn!(role = %placeholder, "Placeholder role not found"),
            Err(e) => tracing::error!(error = %e, "Role lookup failed"),
        }

        let Some(channel) = self.onboarding_channel().await else {
            return Handled::Ignored;
        };
        if let Err(e) = guild
            .send_message(channel.id, &prompts::welcome(member.id))
            .await
        {
            tracing::warn!(error = %e, "Could not post welcome");
        }

        match self.workflow.spawn(member.id, channel.id) {
            Some(handle) => Handled::OnboardingStarted(handle),
            None => Handled::Ignored,
        }
    }

    async fn on_message(&self, message: InboundMessage) -> Handled {
        if message.author.bot {
            return Handled::Ignored;
        }
        if self.is_trigger(&message) {
            tracing::info!(by = %message.author.id, "Reminder sweep requested");
            let sweep = Arc::clone(&self.sweep);
            return Handled::SweepTriggered(tokio::spawn(async move { sweep.run().await }));
        }

        if self.workflow.config().self_start {
            return self.maybe_self_start(&message).await;
        }
        Handled::Ignored
    }

    /// A placeholder holder writing in the onboarding channel gets a fresh
    /// run, which is how an aborted member retries.
    async fn maybe_self_start(&self, message: &InboundMessage) -> Handled {
        let Some(roles) = &message.member_roles else {
            return Handled::Ignored;
        };
        if self.workflow.is_active(message.author.id) {
            return Handled::Ignored;
        }
        let Some(channel) = self.onboarding_channel().await else {
            return Handled::Ignored;
        };
        if channel.id != message.channel_id {
            return Handled::Ignored;
        }
        let placeholder = &self.workflow.config().placeholder_role;
        let holds_placeholder = match self.workflow.guild().find_role_by_name(placeholder).await {
            Ok(Some(role)) => roles.contains(&role.id),
            Ok(None) => false,
            Err(e) => {
                tracing::error!(error = %e, "Role lookup failed");
                false
            }
        };
        if !holds_placeholder {
            return Handled::Ignored;
        }
        match self.workflow.spawn(message.author.id, channel.id) {
            Some(handle) => Handled::OnboardingStarted(handle),
            None => Handled::Ignored,
        }
    }

    /// Consume events until the source ends or `shutdown` resolves.
    ///
    /// Answers are routed inline so they reach the collector in arrival
    /// order; everything else is handled on its own task.
    pub async fn run<F>(
        self: Arc<Self>,
        source: &dyn EventSource,
        shutdown: F,
    ) -> Result<(), PlatformError>
    where
        F: Future<Output = ()>,
    {
        let mut events = source.start().await?;
        tracing::info!(source = source.name(), "Listening for events");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                event = events.next() => {
                    let Some(event) = event else {
                        tracing::warn!(source = source.name(), "Event stream ended");
                        break;
                    };
                    if let PlatformEvent::MessageCreated(message) = &event {
                        if self.try_answer(message) {
                            continue;
                        }
                    }
                    let bot = Arc::clone(&self);
                    tokio::spawn(async move {
                        bot.route(event).await;
                    });
                }
            }
        }
        Ok(())
    }
}
