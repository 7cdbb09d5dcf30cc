//! Onboarding state machine — tracks where one member's conversation is.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::platform::MemberId;

use super::model::{AbortReason, OnboardingResult};
use super::prompts;

/// The phases of one onboarding conversation.
///
/// Progresses linearly: Idle → AwaitingFirstName → AwaitingLastName →
/// AwaitingGraduationYear → Finalizing → Completed. Any awaiting phase and
/// Finalizing may drop to Aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingPhase {
    #[default]
    Idle,
    AwaitingFirstName,
    AwaitingLastName,
    AwaitingGraduationYear,
    Finalizing,
    Completed,
    Aborted,
}

impl OnboardingPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingPhase) -> bool {
        use OnboardingPhase::*;
        matches!(
            (self, target),
            (Idle, AwaitingFirstName)
                | (AwaitingFirstName, AwaitingLastName)
                | (AwaitingLastName, AwaitingGraduationYear)
                | (AwaitingGraduationYear, Finalizing)
                | (Finalizing, Completed)
                | (
                    AwaitingFirstName | AwaitingLastName | AwaitingGraduationYear | Finalizing,
                    Aborted
                )
        )
    }

    /// Whether this phase ends the conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl std::fmt::Display for OnboardingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingFirstName => "awaiting_first_name",
            Self::AwaitingLastName => "awaiting_last_name",
            Self::AwaitingGraduationYear => "awaiting_graduation_year",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// A question the workflow asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Question {
    FirstName,
    LastName,
    GraduationYear,
}

impl Question {
    pub const ALL: [Question; 3] = [Self::FirstName, Self::LastName, Self::GraduationYear];

    /// Phase the conversation is in while this question is open.
    pub fn phase(self) -> OnboardingPhase {
        match self {
            Self::FirstName => OnboardingPhase::AwaitingFirstName,
            Self::LastName => OnboardingPhase::AwaitingLastName,
            Self::GraduationYear => OnboardingPhase::AwaitingGraduationYear,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::FirstName => prompts::ASK_FIRST_NAME,
            Self::LastName => prompts::ASK_LAST_NAME,
            Self::GraduationYear => prompts::ASK_GRADUATION_YEAR,
        }
    }

    fn unanswered(self) -> AbortReason {
        match self {
            Self::FirstName => AbortReason::NoFirstName,
            Self::LastName => AbortReason::NoLastName,
            Self::GraduationYear => AbortReason::NoGraduationYear,
        }
    }
}

/// Transient per-member conversation state. Lives for one workflow run.
#[derive(Debug, Clone)]
pub struct ConversationState {
    member: MemberId,
    phase: OnboardingPhase,
    pending: VecDeque<Question>,
    answers: Vec<String>,
}

impl ConversationState {
    pub fn new(member: MemberId) -> Self {
        Self {
            member,
            phase: OnboardingPhase::Idle,
            pending: Question::ALL.into_iter().collect(),
            answers: Vec::with_capacity(Question::ALL.len()),
        }
    }

    pub fn phase(&self) -> OnboardingPhase {
        self.phase
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    fn transition(&mut self, target: OnboardingPhase) {
        debug_assert!(
            self.phase.can_transition_to(target),
            "invalid onboarding transition {} -> {}",
            self.phase,
            target
        );
        self.phase = target;
    }

    /// Move to the next open question and return it. `None` once every
    /// question is answered or the conversation has ended.
    pub fn next_question(&mut self) -> Option<Question> {
        if self.phase.is_terminal() {
            return None;
        }
        let question = *self.pending.front()?;
        if self.phase != question.phase() {
            self.transition(question.phase());
        }
        Some(question)
    }

    /// Record the reply to the current question. A missing or blank reply
    /// aborts the conversation.
    pub fn record_answer(&mut self, answer: Option<String>) -> Result<(), AbortReason> {
        let Some(question) = self.pending.pop_front() else {
            return Ok(());
        };
        match answer.map(|a| a.trim().to_string()) {
            Some(text) if !text.is_empty() => {
                self.answers.push(text);
                Ok(())
            }
            _ => {
                self.transition(OnboardingPhase::Aborted);
                Err(question.unanswered())
            }
        }
    }

    /// Validate the collected answers.
    pub fn finalize(&mut self) -> Result<OnboardingResult, AbortReason> {
        self.transition(OnboardingPhase::Finalizing);
        let result = match self.answers.as_slice() {
            [first, last, year] => OnboardingResult::from_answers(first, last, year),
            _ => Err(AbortReason::NoGraduationYear),
        };
        if result.is_err() {
            self.transition(OnboardingPhase::Aborted);
        }
        result
    }

    pub fn complete(&mut self) {
        self.transition(OnboardingPhase::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use OnboardingPhase::*;
        let transitions = [
            (Idle, AwaitingFirstName),
            (AwaitingFirstName, AwaitingLastName),
            (AwaitingLastName, AwaitingGraduationYear),
            (AwaitingGraduationYear, Finalizing),
            (Finalizing, Completed),
            (AwaitingFirstName, Aborted),
            (AwaitingLastName, Aborted),
            (AwaitingGraduationYear, Aborted),
            (Finalizing, Aborted),
        ];
        for (from, to) in transitions {
            assert!(
                from.can_transition_to(to),
                "{from} should transition to {to}"
            );
        }
    }

    #[test]
    fn invalid_transitions() {
        use OnboardingPhase::*;
        // Skip phases
        assert!(!Idle.can_transition_to(AwaitingLastName));
        assert!(!AwaitingFirstName.can_transition_to(Finalizing));
        // Go backward
        assert!(!AwaitingLastName.can_transition_to(AwaitingFirstName));
        // Terminal
        assert!(!Completed.can_transition_to(Idle));
        assert!(!Aborted.can_transition_to(AwaitingFirstName));
        assert!(!Completed.can_transition_to(Aborted));
        // Nothing was asked yet
        assert!(!Idle.can_transition_to(Aborted));
    }

    #[test]
    fn display_matches_serde() {
        use OnboardingPhase::*;
        for phase in [
            Idle,
            AwaitingFirstName,
            AwaitingLastName,
            AwaitingGraduationYear,
            Finalizing,
            Completed,
            Aborted,
        ] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{phase}\""), json);
        }
    }

    #[test]
    fn conversation_happy_path() {
        let mut state = ConversationState::new(MemberId(1));
        assert_eq!(state.phase(), OnboardingPhase::Idle);

        let answers = ["Ada", "Lovelace", "2026"];
        for (expected, answer) in Question::ALL.into_iter().zip(answers) {
            let question = state.next_question().unwrap();
            assert_eq!(question, expected);
            assert_eq!(state.phase(), question.phase());
            state.record_answer(Some(format!("  {answer} "))).unwrap();
        }
        assert!(state.next_question().is_none());
        assert_eq!(state.member(), MemberId(1));

        let result = state.finalize().unwrap();
        assert_eq!(result.nickname(), "Ada Lovelace");
        assert_eq!(result.graduation_year, 2026);
        assert_eq!(state.phase(), OnboardingPhase::Finalizing);

        state.complete();
        assert_eq!(state.phase(), OnboardingPhase::Completed);
    }

    #[test]
    fn missing_answer_aborts() {
        let mut state = ConversationState::new(MemberId(1));
        state.next_question();
        state.record_answer(Some("Ada".into())).unwrap();
        state.next_question();
        assert_eq!(state.record_answer(None), Err(AbortReason::NoLastName));
        assert_eq!(state.phase(), OnboardingPhase::Aborted);
        assert!(state.next_question().is_none());
    }

    #[test]
    fn blank_answer_aborts() {
        let mut state = ConversationState::new(MemberId(1));
        state.next_question();
        assert_eq!(
            state.record_answer(Some("   ".into())),
            Err(AbortReason::NoFirstName)
        );
        assert_eq!(state.phase(), OnboardingPhase::Aborted);
    }

    #[test]
    fn bad_year_aborts_at_finalize() {
        let mut state = ConversationState::new(MemberId(1));
        for answer in ["Ada", "Lovelace", "not-a-year"] {
            state.next_question();
            state.record_answer(Some(answer.into())).unwrap();
        }
        assert_eq!(
            state.finalize(),
            Err(AbortReason::InvalidGraduationYear("not-a-year".into()))
        );
        assert_eq!(state.phase(), OnboardingPhase::Aborted);
    }
}
