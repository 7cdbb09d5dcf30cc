//! In-memory guild — records every side effect instead of calling a
//! platform. Backs the local console mode and the test suites.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::PlatformError;

use super::{Channel, ChannelId, ChannelKind, Guild, Member, MemberId, Role, RoleId};

/// Guild operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SendMessage,
    FindChannel,
    FindRole,
    CreateRole,
    FetchMembers,
    SetNickname,
    AddRole,
    RemoveRole,
}

/// A message the guild was asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub text: String,
}

#[derive(Default)]
struct State {
    next_id: u64,
    roles: Vec<Role>,
    channels: Vec<Channel>,
    members: BTreeMap<MemberId, Member>,
    sent: Vec<SentMessage>,
    nickname_changes: Vec<(MemberId, String)>,
    role_changes: usize,
    created_roles: Vec<String>,
    failing: HashSet<Operation>,
    failing_channels: HashSet<ChannelId>,
    failing_mentions: HashSet<MemberId>,
}

/// In-memory [`Guild`].
#[derive(Default)]
pub struct MemoryGuild {
    state: Mutex<State>,
    echo: bool,
}

impl MemoryGuild {
    pub fn new() -> Self {
        Self::default()
    }

    /// A guild that also prints every delivered message to stdout.
    pub fn echoing() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(state: &mut State) -> u64 {
        state.next_id += 1;
        1_000 + state.next_id
    }

    // ── Setup ───────────────────────────────────────────────────────

    pub fn seed_role(&self, name: &str) -> RoleId {
        let mut state = self.lock();
        let id = RoleId(Self::next_id(&mut state));
        state.roles.push(Role {
            id,
            name: name.to_string(),
        });
        id
    }

    pub fn seed_channel(&self, name: &str, kind: ChannelKind) -> ChannelId {
        let mut state = self.lock();
        let id = ChannelId(Self::next_id(&mut state));
        state.channels.push(Channel {
            id,
            name: name.to_string(),
            kind,
        });
        id
    }

    pub fn seed_text_channel(&self, name: &str) -> ChannelId {
        self.seed_channel(name, ChannelKind::Text)
    }

    /// Add a member holding the given roles.
    pub fn seed_member(&self, name: &str, bot: bool, roles: &[RoleId]) -> Member {
        let mut state = self.lock();
        let member = Member {
            id: MemberId(Self::next_id(&mut state)),
            display_name: name.to_string(),
            tag: name.to_lowercase(),
            bot,
            roles: roles.to_vec(),
        };
        state.members.insert(member.id, member.clone());
        member
    }

    /// Make every future call of `op` fail.
    pub fn fail(&self, op: Operation) {
        self.lock().failing.insert(op);
    }

    /// Make sends to one channel fail.
    pub fn fail_sends_to(&self, channel: ChannelId) {
        self.lock().failing_channels.insert(channel);
    }

    /// Make sends that mention `member` fail.
    pub fn fail_sends_mentioning(&self, member: MemberId) {
        self.lock().failing_mentions.insert(member);
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn messages_in(&self, channel: ChannelId) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn member(&self, id: MemberId) -> Option<Member> {
        self.lock().members.get(&id).cloned()
    }

    pub fn role_id(&self, name: &str) -> Option<RoleId> {
        self.lock()
            .roles
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.id)
    }

    pub fn member_has_role(&self, member: MemberId, role_name: &str) -> bool {
        let Some(role) = self.role_id(role_name) else {
            return false;
        };
        self.member(member).is_some_and(|m| m.has_role(role))
    }

    pub fn nickname_changes(&self) -> Vec<(MemberId, String)> {
        self.lock().nickname_changes.clone()
    }

    /// Number of successful role additions and removals.
    pub fn role_changes(&self) -> usize {
        self.lock().role_changes
    }

    pub fn created_roles(&self) -> Vec<String> {
        self.lock().created_roles.clone()
    }

    fn check(state: &State, op: Operation) -> Result<(), PlatformError> {
        if state.failing.contains(&op) {
            return Err(PlatformError::Api {
                endpoint: format!("{op:?}"),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn member_mut(state: &mut State, id: MemberId) -> Result<&mut Member, PlatformError> {
        state.members.get_mut(&id).ok_or(PlatformError::NotFound {
            kind: "member",
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl Guild for MemoryGuild {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError> {
        let mut state = self.lock();
        Self::check(&state, Operation::SendMessage)?;
        let mentions_failing = state
            .failing_mentions
            .iter()
            .any(|member| text.contains(&member.mention()));
        if mentions_failing || state.failing_channels.contains(&channel) {
            return Err(PlatformError::Api {
                endpoint: format!("channels/{channel}/messages"),
                status: 403,
                message: "injected failure".to_string(),
            });
        }
        let Some(name) = state
            .channels
            .iter()
            .find(|c| c.id == channel)
            .map(|c| c.name.clone())
        else {
            return Err(PlatformError::NotFound {
                kind: "channel",
                id: channel.to_string(),
            });
        };
        if self.echo {
            println!("#{name} │ {text}");
        }
        state.sent.push(SentMessage {
            channel,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>, PlatformError> {
        let state = self.lock();
        Self::check(&state, Operation::FindChannel)?;
        Ok(state.channels.iter().find(|c| c.name == name).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, PlatformError> {
        let state = self.lock();
        Self::check(&state, Operation::FindRole)?;
        Ok(state.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn create_role(&self, name: &str, _reason: &str) -> Result<Role, PlatformError> {
        let mut state = self.lock();
        Self::check(&state, Operation::CreateRole)?;
        let role = Role {
            id: RoleId(Self::next_id(&mut state)),
            name: name.to_string(),
        };
        state.roles.push(role.clone());
        state.created_roles.push(name.to_string());
        Ok(role)
    }

    async fn fetch_all_members(&self) -> Result<Vec<Member>, PlatformError> {
        let state = self.lock();
        Self::check(&state, Operation::FetchMembers)?;
        Ok(state.members.values().cloned().collect())
    }

    async fn set_nickname(&self, member: MemberId, nickname: &str) -> Result<(), PlatformError> {
        let mut state = self.lock();
        Self::check(&state, Operation::SetNickname)?;
        Self::member_mut(&mut state, member)?.display_name = nickname.to_string();
        state.nickname_changes.push((member, nickname.to_string()));
        Ok(())
    }

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        Self::check(&state, Operation::AddRole)?;
        let m = Self::member_mut(&mut state, member)?;
        if !m.roles.contains(&role) {
            m.roles.push(role);
        }
        state.role_changes += 1;
        Ok(())
    }

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        Self::check(&state, Operation::RemoveRole)?;
        Self::member_mut(&mut state, member)?
            .roles
            .retain(|r| *r != role);
        state.role_changes += 1;
        Ok(())
    }
}
