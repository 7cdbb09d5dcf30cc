//! Message texts the bot posts during onboarding.

use crate::platform::MemberId;

pub const ASK_FIRST_NAME: &str = "what's your **first name**?";
pub const ASK_LAST_NAME: &str = "what's your **last name**?";
pub const ASK_GRADUATION_YEAR: &str = "what's your **graduation year**?";

pub const INVALID_INPUT: &str =
    "⚠️ Could not complete onboarding. Please try again or contact an admin.";
pub const SOMETHING_WENT_WRONG: &str =
    "⚠️ Something went wrong. Please try again or contact an admin.";

pub const REMINDER_HEADER: &str = "🔔 **Reminder to complete onboarding:**";

/// Audit-log reason attached to roles the bot creates.
pub const ROLE_REASON: &str = "Auto-onboarding";

/// A question addressed to one member.
pub fn question(member: MemberId, question: &str) -> String {
    format!("{}, {question}", member.mention())
}

pub fn welcome(member: MemberId) -> String {
    format!(
        "👋 Welcome {}! Please answer the questions below to complete your onboarding and gain access to the server.",
        member.mention()
    )
}

pub fn reminder(member: MemberId) -> String {
    format!(
        "⏰ {} please respond to the onboarding questions so we can get you full access!",
        member.mention()
    )
}

pub fn announcement(member: MemberId, year: i32) -> String {
    format!("🎉 Welcome Brother {}, class of {year}!", member.mention())
}

pub fn completed(first_name: &str, year: i32, status_role: &str) -> String {
    format!(
        "🎓 Thanks, {first_name}! You’ve been onboarded and assigned to **{year}** and **{status_role}**."
    )
}
