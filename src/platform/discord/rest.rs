//! Discord REST client implementing [`Guild`] for one guild.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::error::PlatformError;
use crate::platform::{Channel, ChannelId, Guild, Member, MemberId, Role, RoleId};

use super::{
    API_BASE, MAX_MESSAGE_LENGTH, parse_channel, parse_member, parse_role, snowflake,
    split_message,
};

/// Page size for the list-members endpoint (API maximum).
const MEMBERS_PAGE_SIZE: usize = 1000;

/// Guild operations over the REST API.
pub struct DiscordGuild {
    token: SecretString,
    guild_id: u64,
    client: reqwest::Client,
}

impl DiscordGuild {
    pub fn new(token: SecretString, guild_id: u64) -> Self {
        Self {
            token,
            guild_id,
            client: reqwest::Client::new(),
        }
    }

    /// Connect to the configured guild, or to the first guild the bot is a
    /// member of when none is configured.
    pub async fn connect(
        token: SecretString,
        guild_id: Option<u64>,
    ) -> Result<Self, PlatformError> {
        let mut guild = Self::new(token, guild_id.unwrap_or_default());
        guild.guild_id = match guild_id {
            Some(id) => id,
            None => {
                let guilds = guild.call(Method::GET, "/users/@me/guilds", None, None).await?;
                guilds
                    .as_array()
                    .and_then(|list| list.first())
                    .and_then(|g| g.get("id"))
                    .and_then(snowflake)
                    .ok_or_else(|| PlatformError::NotFound {
                        kind: "guild",
                        id: "any".to_string(),
                    })?
            }
        };
        tracing::info!(guild_id = guild.guild_id, "Using Discord guild");
        Ok(guild)
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    fn api_url(&self, path: &str) -> String {
        format!("{API_BASE}{path}")
    }

    fn guild_path(&self, rest: &str) -> String {
        format!("/guilds/{}{rest}", self.guild_id)
    }

    /// Issue one request. `204 No Content` comes back as `Value::Null`.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        audit_reason: Option<&str>,
    ) -> Result<Value, PlatformError> {
        let mut request = self
            .client
            .request(method.clone(), self.api_url(path))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.token.expose_secret()),
            );
        if let Some(reason) = audit_reason {
            request = request.header("X-Audit-Log-Reason", reason);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(%method, path, status = status.as_u16(), "Discord API call failed");
            return Err(PlatformError::Api {
                endpoint: format!("{method} {path}"),
                status: status.as_u16(),
                message,
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        resp.json::<Value>()
            .await
            .map_err(|e| PlatformError::InvalidPayload(e.to_string()))
    }

    /// Check that the token is accepted.
    pub async fn health_check(&self) -> Result<(), PlatformError> {
        self.call(Method::GET, "/users/@me", None, None).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<Value>, PlatformError> {
        match self.call(Method::GET, path, None, None).await? {
            Value::Array(items) => Ok(items),
            other => Err(PlatformError::InvalidPayload(format!(
                "expected array from {path}, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl Guild for DiscordGuild {
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError> {
        let path = format!("/channels/{channel}/messages");
        for chunk in split_message(text, MAX_MESSAGE_LENGTH) {
            let body = json!({
                "content": chunk,
                "allowed_mentions": { "parse": ["users"] }
            });
            self.call(Method::POST, &path, Some(body), None).await?;
        }
        Ok(())
    }

    async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>, PlatformError> {
        let channels = self.list(&self.guild_path("/channels")).await?;
        Ok(channels
            .iter()
            .filter_map(parse_channel)
            .find(|c| c.name == name))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, PlatformError> {
        let roles = self.list(&self.guild_path("/roles")).await?;
        Ok(roles.iter().filter_map(parse_role).find(|r| r.name == name))
    }

    async fn create_role(&self, name: &str, reason: &str) -> Result<Role, PlatformError> {
        let created = self
            .call(
                Method::POST,
                &self.guild_path("/roles"),
                Some(json!({ "name": name })),
                Some(reason),
            )
            .await?;
        parse_role(&created)
            .ok_or_else(|| PlatformError::InvalidPayload("create role response".to_string()))
    }

    async fn fetch_all_members(&self) -> Result<Vec<Member>, PlatformError> {
        let mut members = Vec::new();
        let mut after = 0u64;
        loop {
            let path = self.guild_path(&format!(
                "/members?limit={MEMBERS_PAGE_SIZE}&after={after}"
            ));
            let page = self.list(&path).await?;
            let count = page.len();
            for value in &page {
                if let Some(member) = parse_member(value) {
                    after = after.max(member.id.0);
                    members.push(member);
                }
            }
            if count < MEMBERS_PAGE_SIZE {
                break;
            }
        }
        tracing::debug!(count = members.len(), "Fetched guild members");
        Ok(members)
    }

    async fn set_nickname(&self, member: MemberId, nickname: &str) -> Result<(), PlatformError> {
        self.call(
            Method::PATCH,
            &self.guild_path(&format!("/members/{member}")),
            Some(json!({ "nick": nickname })),
            None,
        )
        .await?;
        Ok(())
    }

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        self.call(
            Method::PUT,
            &self.guild_path(&format!("/members/{member}/roles/{role}")),
            None,
            None,
        )
        .await?;
        Ok(())
    }

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        self.call(
            Method::DELETE,
            &self.guild_path(&format!("/members/{member}/roles/{role}")),
            None,
            None,
        )
        .await?;
        Ok(())
    }
}
