//! End-to-end onboarding against the in-memory guild.
//!
//! Every test runs on a paused clock so answer timeouts elapse instantly
//! once nothing else is runnable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use onboard_bot::bot::{Handled, OnboardingBot};
use onboard_bot::config::OnboardingConfig;
use onboard_bot::error::PlatformError;
use onboard_bot::onboarding::{
    AbortReason, OnboardingWorkflow, ResponseCollector, StatusLabel, WorkflowOutcome, prompts,
};
use onboard_bot::platform::memory::{MemoryGuild, Operation};
use onboard_bot::platform::{
    ChannelId, EventSource, EventStream, InboundMessage, Member, MemberId, MessageAuthor,
    PlatformEvent, RoleId,
};

struct Harness {
    guild: Arc<MemoryGuild>,
    workflow: Arc<OnboardingWorkflow>,
    bot: Arc<OnboardingBot>,
    channel: ChannelId,
    announcements: ChannelId,
    placeholder: RoleId,
}

fn harness() -> Harness {
    let guild = Arc::new(MemoryGuild::new());
    let config = OnboardingConfig::default();
    let placeholder = guild.seed_role(&config.placeholder_role);
    guild.seed_role(&config.active_role);
    guild.seed_role(&config.alumni_role);
    let channel = guild.seed_text_channel(&config.onboarding_channel);
    let announcements = guild.seed_text_channel(&config.announcement_channel);

    let collector = Arc::new(ResponseCollector::new(
        guild.clone(),
        config.answer_timeout,
    ));
    let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let workflow = Arc::new(
        OnboardingWorkflow::new(guild.clone(), collector, config)
            .with_clock(Arc::new(move || today)),
    );
    let bot = Arc::new(OnboardingBot::new(Arc::clone(&workflow), "CLVEN"));

    Harness {
        guild,
        workflow,
        bot,
        channel,
        announcements,
        placeholder,
    }
}

impl Harness {
    fn newcomer(&self, name: &str) -> Member {
        self.guild.seed_member(name, false, &[self.placeholder])
    }

    fn message(&self, member: &Member, channel: ChannelId, content: &str) -> InboundMessage {
        let roles = self.guild.member(member.id).map(|m| m.roles);
        InboundMessage {
            channel_id: channel,
            author: MessageAuthor {
                id: member.id,
                name: member.tag.clone(),
                bot: member.bot,
            },
            member_roles: roles,
            content: content.to_string(),
        }
    }

    async fn wait_for_question(&self, member: MemberId) {
        for _ in 0..200 {
            if self.workflow.collector().is_waiting(member) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("no question pending for {member}");
    }

    /// Answer the next question the member is asked, through the bot.
    async fn answer(&self, member: &Member, text: &str) {
        self.wait_for_question(member.id).await;
        let event = PlatformEvent::MessageCreated(self.message(member, self.channel, text));
        assert!(matches!(
            self.bot.handle_event(event).await,
            Handled::Answered
        ));
    }

    async fn answer_all(&self, member: &Member, answers: &[&str]) {
        for text in answers {
            self.answer(member, text).await;
        }
    }

    fn count_in(&self, channel: ChannelId, text: &str) -> usize {
        self.guild
            .messages_in(channel)
            .iter()
            .filter(|m| m.as_str() == text)
            .count()
    }
}

#[tokio::test(start_paused = true)]
async fn member_is_onboarded_end_to_end() {
    let h = harness();
    let ada = h.newcomer("ada");

    let run = h.workflow.spawn(ada.id, h.channel).unwrap();
    h.answer_all(&ada, &["Ada", "Lovelace", "2026"]).await;
    let outcome = run.await.unwrap();

    match outcome {
        WorkflowOutcome::Completed { result, status } => {
            assert_eq!(result.nickname(), "Ada Lovelace");
            assert_eq!(status, StatusLabel::Active);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(
        h.guild.nickname_changes(),
        vec![(ada.id, "Ada Lovelace".to_string())]
    );
    assert_eq!(h.guild.created_roles(), vec!["2026".to_string()]);
    assert!(h.guild.member_has_role(ada.id, "2026"));
    assert!(h.guild.member_has_role(ada.id, "Active"));
    assert!(!h.guild.member_has_role(ada.id, "Missing Info"));

    assert_eq!(
        h.guild.messages_in(h.announcements),
        vec![format!("🎉 Welcome Brother <@{}>, class of 2026!", ada.id)]
    );
    let conversation = h.guild.messages_in(h.channel);
    assert_eq!(
        conversation
            .iter()
            .filter(|m| m.starts_with("🎓 Thanks, Ada!"))
            .count(),
        1
    );
    assert_eq!(
        conversation[..3],
        [
            prompts::question(ada.id, prompts::ASK_FIRST_NAME),
            prompts::question(ada.id, prompts::ASK_LAST_NAME),
            prompts::question(ada.id, prompts::ASK_GRADUATION_YEAR),
        ]
    );
    assert!(h.workflow.active().is_empty());
}

#[tokio::test(start_paused = true)]
async fn bad_year_aborts_without_side_effects() {
    let h = harness();
    let ada = h.newcomer("ada");

    let run = h.workflow.spawn(ada.id, h.channel).unwrap();
    h.answer_all(&ada, &["Ada", "Lovelace", "not-a-year"]).await;

    assert_eq!(
        run.await.unwrap(),
        WorkflowOutcome::Aborted(AbortReason::InvalidGraduationYear("not-a-year".into()))
    );
    assert!(h.guild.nickname_changes().is_empty());
    assert_eq!(h.guild.role_changes(), 0);
    assert!(h.guild.created_roles().is_empty());
    assert!(h.guild.member_has_role(ada.id, "Missing Info"));
    assert_eq!(h.count_in(h.channel, prompts::INVALID_INPUT), 1);
    assert!(h.guild.messages_in(h.announcements).is_empty());
    assert!(h.workflow.active().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unanswered_question_times_out_and_releases() {
    let h = harness();
    let ada = h.newcomer("ada");

    let run = h.workflow.spawn(ada.id, h.channel).unwrap();
    h.wait_for_question(ada.id).await;
    assert!(h.workflow.is_active(ada.id));

    // Nothing answers; the paused clock jumps past the wait window.
    assert_eq!(
        run.await.unwrap(),
        WorkflowOutcome::Aborted(AbortReason::NoFirstName)
    );
    assert!(!h.workflow.is_active(ada.id));
    assert_eq!(h.workflow.collector().pending_count(), 0);
    assert_eq!(h.count_in(h.channel, prompts::INVALID_INPUT), 1);

    // A late reply is now an ordinary message, which restarts onboarding.
    let late = PlatformEvent::MessageCreated(h.message(&ada, h.channel, "Ada"));
    assert!(matches!(
        h.bot.handle_event(late).await,
        Handled::OnboardingStarted(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn double_entry_runs_once() {
    let h = harness();
    let ada = h.newcomer("ada");

    let first = h.workflow.spawn(ada.id, h.channel);
    let second = h.workflow.spawn(ada.id, h.channel);
    assert!(first.is_some());
    assert!(second.is_none());
    assert!(h.workflow.run(ada.id, h.channel).await.is_none());

    h.answer_all(&ada, &["Ada", "Lovelace", "2026"]).await;
    assert!(first.unwrap().await.unwrap().is_completed());

    assert_eq!(h.guild.nickname_changes().len(), 1);
    assert_eq!(h.guild.messages_in(h.announcements).len(), 1);
    // year role + status role + placeholder removal
    assert_eq!(h.guild.role_changes(), 3);
}

#[tokio::test(start_paused = true)]
async fn platform_failure_reports_and_releases() {
    let h = harness();
    let ada = h.newcomer("ada");
    h.guild.fail(Operation::SetNickname);

    let run = h.workflow.spawn(ada.id, h.channel).unwrap();
    h.answer_all(&ada, &["Ada", "Lovelace", "2026"]).await;

    assert!(matches!(run.await.unwrap(), WorkflowOutcome::Failed(_)));
    assert_eq!(h.count_in(h.channel, prompts::SOMETHING_WENT_WRONG), 1);
    assert_eq!(h.guild.role_changes(), 0);
    assert!(h.guild.member_has_role(ada.id, "Missing Info"));
    assert!(h.workflow.active().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failure_late_in_the_run_keeps_earlier_steps() {
    let h = harness();
    let ada = h.newcomer("ada");
    h.guild.fail_sends_to(h.announcements);

    let run = h.workflow.spawn(ada.id, h.channel).unwrap();
    h.answer_all(&ada, &["Ada", "Lovelace", "2026"]).await;

    assert!(matches!(run.await.unwrap(), WorkflowOutcome::Failed(_)));
    assert!(h.guild.member_has_role(ada.id, "2026"));
    assert!(h.guild.member_has_role(ada.id, "Active"));
    assert!(!h.guild.member_has_role(ada.id, "Missing Info"));
    assert_eq!(h.count_in(h.channel, prompts::SOMETHING_WENT_WRONG), 1);
    assert!(
        h.guild
            .messages_in(h.channel)
            .iter()
            .all(|m| !m.starts_with("🎓"))
    );
}

#[tokio::test(start_paused = true)]
async fn sweep_prompts_only_placeholder_holders() {
    let h = harness();
    let waiting: Vec<Member> = ["ada", "grace", "alan"]
        .into_iter()
        .map(|name| h.newcomer(name))
        .collect();
    let active_role = h.guild.role_id("Active").unwrap();
    h.guild.seed_member("barbara", false, &[active_role]);
    h.guild.seed_member("edsger", false, &[]);
    h.guild.seed_member("helper-bot", true, &[h.placeholder]);

    let summary = h.bot.sweep().run().await;
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.prompted, 3);
    assert_eq!(summary.started, 3);
    assert_eq!(summary.failed, 0);

    assert_eq!(h.count_in(h.channel, prompts::REMINDER_HEADER), 1);
    for member in &waiting {
        assert_eq!(h.count_in(h.channel, &prompts::reminder(member.id)), 1);
        h.wait_for_question(member.id).await;
    }
    assert_eq!(h.workflow.active().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_reminder_does_not_stop_the_sweep() {
    let h = harness();
    let ada = h.newcomer("ada");
    let grace = h.newcomer("grace");
    let alan = h.newcomer("alan");
    h.guild.fail_sends_mentioning(grace.id);

    let summary = h.bot.sweep().run().await;
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.prompted, 2);
    assert_eq!(summary.started, 2);

    for member in [&ada, &alan] {
        assert_eq!(h.count_in(h.channel, &prompts::reminder(member.id)), 1);
        h.wait_for_question(member.id).await;
    }
    assert_eq!(h.count_in(h.channel, &prompts::reminder(grace.id)), 0);
    assert!(!h.workflow.is_active(grace.id));
    assert_eq!(h.workflow.active().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn sweep_skips_members_mid_conversation() {
    let h = harness();
    let ada = h.newcomer("ada");
    let grace = h.newcomer("grace");

    let _run = h.workflow.spawn(ada.id, h.channel).unwrap();
    h.wait_for_question(ada.id).await;

    let summary = h.bot.sweep().run().await;
    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.already_active, 1);
    assert_eq!(summary.started, 1);
    assert_eq!(h.count_in(h.channel, &prompts::reminder(ada.id)), 0);
    assert_eq!(h.count_in(h.channel, &prompts::reminder(grace.id)), 1);
    assert_eq!(
        h.count_in(
            h.channel,
            &prompts::question(ada.id, prompts::ASK_FIRST_NAME)
        ),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn sweep_without_candidates_stays_quiet() {
    let h = harness();
    h.guild.seed_member("edsger", false, &[]);

    let summary = h.bot.sweep().run().await;
    assert_eq!(summary.candidates, 0);
    assert!(h.guild.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn keyword_triggers_sweep_case_insensitively() {
    let h = harness();
    h.newcomer("ada");
    let admin = h.guild.seed_member("admin", false, &[]);
    let general = h.guild.seed_text_channel("general");

    let event = PlatformEvent::MessageCreated(h.message(&admin, general, "  clven "));
    let Handled::SweepTriggered(sweep) = h.bot.handle_event(event).await else {
        panic!("keyword did not trigger the sweep");
    };
    let summary = sweep.await.unwrap();
    assert_eq!(summary.started, 1);
}

#[tokio::test(start_paused = true)]
async fn bot_messages_are_ignored() {
    let h = harness();
    let helper = h.guild.seed_member("helper-bot", true, &[h.placeholder]);

    for content in ["CLVEN", "hello"] {
        let event = PlatformEvent::MessageCreated(h.message(&helper, h.channel, content));
        assert!(matches!(h.bot.handle_event(event).await, Handled::Ignored));
    }
    assert!(h.guild.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn join_assigns_placeholder_and_starts_onboarding() {
    let h = harness();
    let ada = h.guild.seed_member("ada", false, &[]);

    let joined = PlatformEvent::MemberJoined(ada.clone());
    let Handled::OnboardingStarted(run) = h.bot.handle_event(joined).await else {
        panic!("join did not start onboarding");
    };
    assert!(h.guild.member_has_role(ada.id, "Missing Info"));
    assert_eq!(
        h.guild.messages_in(h.channel).first(),
        Some(&prompts::welcome(ada.id))
    );

    h.answer_all(&ada, &["Ada", "Lovelace", "2026"]).await;
    assert!(run.await.unwrap().is_completed());
    assert!(!h.guild.member_has_role(ada.id, "Missing Info"));
}

#[tokio::test(start_paused = true)]
async fn placeholder_member_can_start_by_writing() {
    let h = harness();
    let ada = h.newcomer("ada");
    let onboarded = h.guild.seed_member("grace", false, &[]);
    let general = h.guild.seed_text_channel("general");

    let elsewhere = PlatformEvent::MessageCreated(h.message(&ada, general, "hi"));
    assert!(matches!(h.bot.handle_event(elsewhere).await, Handled::Ignored));

    let not_waiting = PlatformEvent::MessageCreated(h.message(&onboarded, h.channel, "hi"));
    assert!(matches!(
        h.bot.handle_event(not_waiting).await,
        Handled::Ignored
    ));

    let hello = PlatformEvent::MessageCreated(h.message(&ada, h.channel, "hi"));
    assert!(matches!(
        h.bot.handle_event(hello).await,
        Handled::OnboardingStarted(_)
    ));
    h.wait_for_question(ada.id).await;
}

/// Replays a fixed list of events and then ends.
struct Scripted(Vec<PlatformEvent>);

#[async_trait]
impl EventSource for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<EventStream, PlatformError> {
        Ok(Box::pin(futures::stream::iter(self.0.clone())))
    }
}

#[tokio::test(start_paused = true)]
async fn run_loop_handles_events_until_the_stream_ends() {
    let h = harness();
    let ada = h.guild.seed_member("ada", false, &[]);
    let source = Scripted(vec![
        PlatformEvent::Ready {
            user: "onboard-bot".into(),
        },
        PlatformEvent::MemberJoined(ada.clone()),
    ]);

    Arc::clone(&h.bot)
        .run(&source, std::future::pending())
        .await
        .unwrap();

    h.wait_for_question(ada.id).await;
    assert!(h.guild.member_has_role(ada.id, "Missing Info"));
}
