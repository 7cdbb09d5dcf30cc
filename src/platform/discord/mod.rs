//! Discord adapter — REST v10 for guild operations, the websocket gateway
//! for events.
//!
//! Payloads are decoded straight from `serde_json::Value`; only the handful
//! of fields the bot reads are looked at.

pub mod gateway;
pub mod rest;

pub use gateway::DiscordGateway;
pub use rest::DiscordGuild;

use serde_json::Value;

use super::{
    Channel, ChannelId, ChannelKind, InboundMessage, Member, MemberId, MessageAuthor, Role, RoleId,
};

/// Base URL for the REST API.
pub const API_BASE: &str = "https://discord.com/api/v10";

/// Maximum message length for the create-message endpoint.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Snowflakes arrive as strings; accept numbers too.
pub(crate) fn snowflake(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

pub(crate) fn parse_role(value: &Value) -> Option<Role> {
    Some(Role {
        id: RoleId(snowflake(value.get("id")?)?),
        name: value.get("name")?.as_str()?.to_string(),
    })
}

pub(crate) fn parse_channel(value: &Value) -> Option<Channel> {
    let kind = match value.get("type").and_then(Value::as_u64)? {
        // text, announcement, threads
        0 | 5 | 10 | 11 | 12 => ChannelKind::Text,
        2 | 13 => ChannelKind::Voice,
        4 => ChannelKind::Category,
        _ => ChannelKind::Other,
    };
    Some(Channel {
        id: ChannelId(snowflake(value.get("id")?)?),
        name: value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        kind,
    })
}

fn parse_roles(value: Option<&Value>) -> Option<Vec<RoleId>> {
    Some(
        value?
            .as_array()?
            .iter()
            .filter_map(snowflake)
            .map(RoleId)
            .collect(),
    )
}

fn user_name(user: &Value) -> String {
    user.get("global_name")
        .and_then(Value::as_str)
        .or_else(|| user.get("username").and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string()
}

/// Decode a guild member object (`{ user, nick, roles }`).
pub(crate) fn parse_member(value: &Value) -> Option<Member> {
    let user = value.get("user")?;
    let tag = user
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let display_name = value
        .get("nick")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| user_name(user));
    Some(Member {
        id: MemberId(snowflake(user.get("id")?)?),
        display_name,
        tag,
        bot: user.get("bot").and_then(Value::as_bool).unwrap_or(false),
        roles: parse_roles(value.get("roles")).unwrap_or_default(),
    })
}

/// Decode a MESSAGE_CREATE payload. Direct messages (no guild) are dropped.
pub(crate) fn parse_message(value: &Value) -> Option<InboundMessage> {
    value.get("guild_id")?;
    let author = value.get("author")?;
    Some(InboundMessage {
        channel_id: ChannelId(snowflake(value.get("channel_id")?)?),
        author: MessageAuthor {
            id: MemberId(snowflake(author.get("id")?)?),
            name: user_name(author),
            bot: author.get("bot").and_then(Value::as_bool).unwrap_or(false),
        },
        member_roles: value.get("member").and_then(|m| parse_roles(m.get("roles"))),
        content: value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Split a message into chunks that fit the length limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
