//! Chat-platform abstraction — the collaborator surface the onboarding core
//! consumes, plus the adapters that implement it.

pub mod console;
pub mod discord;
pub mod memory;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::PlatformError;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// A guild member (user) id.
    MemberId
);
snowflake_id!(ChannelId);
snowflake_id!(RoleId);

impl MemberId {
    /// Mention markup that pings the member.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    /// Whether messages can be posted and read here.
    pub fn is_conversational(&self) -> bool {
        self.kind == ChannelKind::Text
    }
}

/// Snapshot of a guild member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    /// Nickname if set, otherwise the account's display name.
    pub display_name: String,
    /// Account username, used in logs.
    pub tag: String,
    pub bot: bool,
    pub roles: Vec<RoleId>,
}

impl Member {
    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAuthor {
    pub id: MemberId,
    pub name: String,
    pub bot: bool,
}

/// A message posted in a guild channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel_id: ChannelId,
    pub author: MessageAuthor,
    /// The author's roles, when the platform attached them to the event.
    pub member_roles: Option<Vec<RoleId>>,
    pub content: String,
}

/// Events the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Ready { user: String },
    MemberJoined(Member),
    MessageCreated(InboundMessage),
}

/// Stream of platform events.
pub type EventStream = Pin<Box<dyn Stream<Item = PlatformEvent> + Send>>;

/// Operations on the guild the bot manages.
///
/// Every call is a suspension point; implementations talk to the platform
/// directly and keep no caches the core relies on.
#[async_trait]
pub trait Guild: Send + Sync {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError>;

    async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>, PlatformError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, PlatformError>;

    async fn create_role(&self, name: &str, reason: &str) -> Result<Role, PlatformError>;

    async fn fetch_all_members(&self) -> Result<Vec<Member>, PlatformError>;

    async fn set_nickname(&self, member: MemberId, nickname: &str) -> Result<(), PlatformError>;

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError>;

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError>;
}

/// A source of platform events (gateway connection, console, ...).
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Start producing events.
    async fn start(&self) -> Result<EventStream, PlatformError>;
}
