//! Onboarding data models.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Leading integer, the way members tend to type years ("2026", "2026!").
static LEADING_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("valid regex"));

/// Member standing derived from the graduation year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Active,
    Alumni,
}

impl std::fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Alumni => write!(f, "Alumni"),
        }
    }
}

/// Validated answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingResult {
    pub first_name: String,
    pub last_name: String,
    pub graduation_year: i32,
}

impl OnboardingResult {
    pub fn from_answers(first: &str, last: &str, year: &str) -> Result<Self, AbortReason> {
        let first_name = first.trim();
        let last_name = last.trim();
        if first_name.is_empty() {
            return Err(AbortReason::NoFirstName);
        }
        if last_name.is_empty() {
            return Err(AbortReason::NoLastName);
        }
        let graduation_year = parse_graduation_year(year)
            .ok_or_else(|| AbortReason::InvalidGraduationYear(year.trim().to_string()))?;
        Ok(Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            graduation_year,
        })
    }

    /// Nickname the member is given.
    pub fn nickname(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Read the leading integer of an answer. `None` for anything that does not
/// start with digits or does not fit an `i32`.
pub fn parse_graduation_year(text: &str) -> Option<i32> {
    LEADING_INTEGER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Why a conversation ended without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "input")]
pub enum AbortReason {
    NoFirstName,
    NoLastName,
    NoGraduationYear,
    InvalidGraduationYear(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFirstName => write!(f, "no first name given"),
            Self::NoLastName => write!(f, "no last name given"),
            Self::NoGraduationYear => write!(f, "no graduation year given"),
            Self::InvalidGraduationYear(input) => {
                write!(f, "graduation year '{input}' is not a number")
            }
        }
    }
}

/// How a workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed {
        result: OnboardingResult,
        status: StatusLabel,
    },
    /// Validation failed or a question timed out. Nothing was changed.
    Aborted(AbortReason),
    /// A platform call failed part-way. Steps before it stay applied.
    Failed(String),
}

impl WorkflowOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
