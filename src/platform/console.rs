//! Console event source — stdin lines become messages from one simulated
//! member, for trying the onboarding flow locally without a Discord token.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::config::OnboardingConfig;
use crate::error::PlatformError;

use super::memory::MemoryGuild;
use super::{
    ChannelId, EventSource, EventStream, InboundMessage, Member, MessageAuthor, PlatformEvent,
};

/// Build a guild with the roles and channels the onboarding config names,
/// plus the member the console speaks for.
pub fn demo_guild(config: &OnboardingConfig) -> (Arc<MemoryGuild>, Member, ChannelId) {
    let guild = MemoryGuild::echoing();
    guild.seed_role(&config.placeholder_role);
    guild.seed_role(&config.active_role);
    guild.seed_role(&config.alumni_role);
    let channel = guild.seed_text_channel(&config.onboarding_channel);
    guild.seed_text_channel(&config.announcement_channel);
    let member = guild.seed_member("console-user", false, &[]);
    (Arc::new(guild), member, channel)
}

/// Reads stdin and speaks as `member` in `channel`.
pub struct ConsoleEvents {
    guild: Arc<MemoryGuild>,
    member: Member,
    channel: ChannelId,
}

impl ConsoleEvents {
    pub fn new(guild: Arc<MemoryGuild>, member: Member, channel: ChannelId) -> Self {
        Self {
            guild,
            member,
            channel,
        }
    }

    fn message(&self, content: &str) -> InboundMessage {
        let roles = self.guild.member(self.member.id).map(|m| m.roles);
        InboundMessage {
            channel_id: self.channel,
            author: MessageAuthor {
                id: self.member.id,
                name: self.member.tag.clone(),
                bot: false,
            },
            member_roles: roles,
            content: content.to_string(),
        }
    }
}

#[async_trait]
impl EventSource for ConsoleEvents {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> Result<EventStream, PlatformError> {
        let (tx, rx) = mpsc::unbounded_channel();

        // The simulated member joins first, which kicks off onboarding.
        tx.send(PlatformEvent::Ready {
            user: "console".to_string(),
        })
        .and_then(|_| tx.send(PlatformEvent::MemberJoined(self.member.clone())))
        .map_err(|_| PlatformError::StartupFailed {
            name: "console".into(),
            reason: "event receiver dropped".into(),
        })?;

        let guild = Arc::clone(&self.guild);
        let source = ConsoleEvents::new(guild, self.member.clone(), self.channel);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if tx.send(PlatformEvent::MessageCreated(source.message(line))).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }
}
