//! Onboarding — the per-member question/answer flow and what it decides.
//!
//! A member joins (or is swept up by the reminder) → the workflow asks three
//! questions through the collector → valid answers become a nickname, a
//! class-year role and a status role.

pub mod classifier;
pub mod collector;
pub mod model;
pub mod prompts;
pub mod registry;
pub mod state;
pub mod sweep;
pub mod workflow;

pub use classifier::{classify, classify_with_cutoff};
pub use collector::ResponseCollector;
pub use model::{AbortReason, OnboardingResult, StatusLabel, WorkflowOutcome};
pub use registry::{ActiveGuard, ActiveMembers};
pub use state::{ConversationState, OnboardingPhase, Question};
pub use sweep::{ReminderSweep, SweepSummary};
pub use workflow::{OnboardingWorkflow, Today, today_in};
