//! Configuration types.
//!
//! Everything is read from environment variables with defaults matching the
//! community server the bot was written for. Channel names, role names and
//! the status cutoff are data, not code.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::onboarding::StatusLabel;

/// How long a member has to answer a single question.
pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(60);

/// Daily at noon (sec min hour dom month dow).
pub const DEFAULT_REMINDER_CRON: &str = "0 0 12 * * *";

/// Month/day boundary after which a class graduating this year counts as
/// alumni.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCutoff {
    pub month: u32,
    pub day: u32,
}

impl StatusCutoff {
    pub const JUNE_FIRST: StatusCutoff = StatusCutoff { month: 6, day: 1 };
}

impl Default for StatusCutoff {
    fn default() -> Self {
        Self::JUNE_FIRST
    }
}

impl FromStr for StatusCutoff {
    type Err = String;

    /// Parses `MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (month, day) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected MM-DD, got '{s}'"))?;
        let month: u32 = month.parse().map_err(|_| format!("bad month in '{s}'"))?;
        let day: u32 = day.parse().map_err(|_| format!("bad day in '{s}'"))?;
        // 2024 is a leap year, so 02-29 is accepted.
        if NaiveDate::from_ymd_opt(2024, month, day).is_none() {
            return Err(format!("'{s}' is not a calendar day"));
        }
        Ok(Self { month, day })
    }
}

/// Names and rules the onboarding workflow works against.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Role every new member holds until onboarding completes.
    pub placeholder_role: String,
    /// Channel where questions are asked.
    pub onboarding_channel: String,
    /// Channel for the public welcome announcement.
    pub announcement_channel: String,
    pub active_role: String,
    pub alumni_role: String,
    pub answer_timeout: Duration,
    pub status_cutoff: StatusCutoff,
    /// Start onboarding when a placeholder member writes in the onboarding
    /// channel without being asked.
    pub self_start: bool,
}

impl OnboardingConfig {
    /// Role name a status label maps to.
    pub fn status_role(&self, status: StatusLabel) -> &str {
        match status {
            StatusLabel::Active => &self.active_role,
            StatusLabel::Alumni => &self.alumni_role,
        }
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            placeholder_role: "Missing Info".to_string(),
            onboarding_channel: "❓-new-members".to_string(),
            announcement_channel: "📢-announcements".to_string(),
            active_role: "Active".to_string(),
            alumni_role: "Alumni".to_string(),
            answer_timeout: DEFAULT_ANSWER_TIMEOUT,
            status_cutoff: StatusCutoff::default(),
            self_start: true,
        }
    }
}

/// Reminder and shutdown timing.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Cron expression for the reminder sweep.
    pub reminder_cron: String,
    /// Local wall-clock time to stop the process, if any.
    pub shutdown_at: Option<NaiveTime>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reminder_cron: DEFAULT_REMINDER_CRON.to_string(),
            shutdown_at: None,
        }
    }
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Discord bot token. Unset means local console mode.
    pub token: Option<SecretString>,
    /// Guild to operate on. Unset means the first guild the bot is in.
    pub guild_id: Option<u64>,
    /// Plain-text keyword that runs the reminder sweep on demand.
    pub trigger_keyword: String,
    /// Timezone for "today", reminders and shutdown.
    pub timezone: Tz,
    /// Directory for daily rolling log files. Unset logs to stderr.
    pub log_dir: Option<PathBuf>,
    pub onboarding: OnboardingConfig,
    pub schedule: ScheduleConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            guild_id: None,
            trigger_keyword: "CLVEN".to_string(),
            timezone: chrono_tz::America::New_York,
            log_dir: None,
            onboarding: OnboardingConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let token = get("DISCORD_TOKEN").map(SecretString::from);

        let guild_id = get("DISCORD_GUILD_ID")
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| ConfigError::invalid("DISCORD_GUILD_ID", "expected a numeric id"))
            })
            .transpose()?;

        let timezone = match get("ONBOARD_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| ConfigError::invalid("ONBOARD_TIMEZONE", e.to_string()))?,
            None => defaults.timezone,
        };

        let answer_timeout = match get("ONBOARD_ANSWER_TIMEOUT_SECS") {
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::invalid(
                        "ONBOARD_ANSWER_TIMEOUT_SECS",
                        "expected a positive number of seconds",
                    ));
                }
            },
            None => DEFAULT_ANSWER_TIMEOUT,
        };

        let status_cutoff = match get("ONBOARD_STATUS_CUTOFF") {
            Some(v) => v
                .parse::<StatusCutoff>()
                .map_err(|e| ConfigError::invalid("ONBOARD_STATUS_CUTOFF", e))?,
            None => StatusCutoff::default(),
        };

        let self_start = match get("ONBOARD_SELF_START") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| ConfigError::invalid("ONBOARD_SELF_START", "expected true/false"))?,
            None => true,
        };

        let reminder_cron = get("ONBOARD_REMINDER_CRON").unwrap_or(defaults.schedule.reminder_cron);
        crate::scheduler::parse_schedule(&reminder_cron)?;

        let shutdown_at = get("ONBOARD_SHUTDOWN_AT")
            .map(|v| {
                NaiveTime::parse_from_str(&v, "%H:%M")
                    .map_err(|_| ConfigError::invalid("ONBOARD_SHUTDOWN_AT", "expected HH:MM"))
            })
            .transpose()?;

        let o = defaults.onboarding;
        Ok(Self {
            token,
            guild_id,
            trigger_keyword: get("ONBOARD_TRIGGER_KEYWORD").unwrap_or(defaults.trigger_keyword),
            timezone,
            log_dir: get("ONBOARD_LOG_DIR").map(PathBuf::from),
            onboarding: OnboardingConfig {
                placeholder_role: get("ONBOARD_PLACEHOLDER_ROLE").unwrap_or(o.placeholder_role),
                onboarding_channel: get("ONBOARD_CHANNEL").unwrap_or(o.onboarding_channel),
                announcement_channel: get("ONBOARD_ANNOUNCE_CHANNEL")
                    .unwrap_or(o.announcement_channel),
                active_role: get("ONBOARD_ACTIVE_ROLE").unwrap_or(o.active_role),
                alumni_role: get("ONBOARD_ALUMNI_ROLE").unwrap_or(o.alumni_role),
                answer_timeout,
                status_cutoff,
                self_start,
            },
            schedule: ScheduleConfig {
                reminder_cron,
                shutdown_at,
            },
        })
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
