//! Discord gateway — websocket session producing [`PlatformEvent`]s.
//!
//! Identifies with the intents the bot needs, keeps the heartbeat going and
//! forwards MEMBER_ADD / MESSAGE_CREATE / READY dispatches. When the session
//! drops it reconnects with a fresh identify; events missed in between are
//! lost (the reminder sweep picks up anyone left behind).

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::PlatformError;
use crate::platform::{EventSource, EventStream, PlatformEvent};

use super::{parse_member, parse_message, snowflake};

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILDS | GUILD_MEMBERS | GUILD_MESSAGES | MESSAGE_CONTENT
pub const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 9) | (1 << 15);

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

mod op {
    pub const DISPATCH: u64 = 0;
    pub const HEARTBEAT: u64 = 1;
    pub const IDENTIFY: u64 = 2;
    pub const RECONNECT: u64 = 7;
    pub const INVALID_SESSION: u64 = 9;
    pub const HELLO: u64 = 10;
    pub const HEARTBEAT_ACK: u64 = 11;
}

/// Gateway event source.
pub struct DiscordGateway {
    token: SecretString,
    guild_id: u64,
}

impl DiscordGateway {
    /// Events from guilds other than `guild_id` are dropped.
    pub fn new(token: SecretString, guild_id: u64) -> Self {
        Self { token, guild_id }
    }
}

#[async_trait]
impl EventSource for DiscordGateway {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<EventStream, PlatformError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.token.clone();
        let guild_id = self.guild_id;

        tokio::spawn(async move {
            loop {
                match run_session(&token, guild_id, &tx).await {
                    Ok(()) => {
                        tracing::info!("Gateway listener channel closed");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("Gateway session ended: {e}");
                    }
                }
                if tx.is_closed() {
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }
}

/// Run one gateway session. `Ok(())` means the event receiver went away.
async fn run_session(
    token: &SecretString,
    guild_id: u64,
    tx: &mpsc::UnboundedSender<PlatformEvent>,
) -> Result<(), PlatformError> {
    let (ws, _) = connect_async(GATEWAY_URL)
        .await
        .map_err(|e| PlatformError::Gateway(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    let hello = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => break parse_payload(text.as_str())?,
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(PlatformError::Gateway(e.to_string())),
            None => return Err(PlatformError::Gateway("closed before hello".into())),
        }
    };
    let heartbeat_ms = heartbeat_interval(&hello)?;

    let identify = json!({
        "op": op::IDENTIFY,
        "d": {
            "token": token.expose_secret(),
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "onboard-bot",
                "device": "onboard-bot"
            }
        }
    });
    send(&mut sink, &identify).await?;

    // First beat is jittered so reconnecting shards don't beat in lockstep.
    let period = Duration::from_millis(heartbeat_ms);
    let first = period.mul_f64(rand::random::<f64>());
    let mut heartbeat = interval_at(Instant::now() + first, period);
    let mut seq: Option<u64> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                send(&mut sink, &json!({ "op": op::HEARTBEAT, "d": seq })).await?;
            }
            msg = stream.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        return Err(PlatformError::Gateway(format!("closed by server: {frame:?}")));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(PlatformError::Gateway(e.to_string())),
                    None => return Err(PlatformError::Gateway("stream ended".into())),
                };
                let payload = parse_payload(text.as_str())?;
                if let Some(s) = payload.get("s").and_then(Value::as_u64) {
                    seq = Some(s);
                }
                match payload.get("op").and_then(Value::as_u64) {
                    Some(op::DISPATCH) => {
                        if let Some(event) = decode_dispatch(&payload, guild_id)
                            && tx.send(event).is_err()
                        {
                            return Ok(());
                        }
                    }
                    Some(op::HEARTBEAT) => {
                        send(&mut sink, &json!({ "op": op::HEARTBEAT, "d": seq })).await?;
                    }
                    Some(op::RECONNECT) => {
                        return Err(PlatformError::Gateway("server requested reconnect".into()));
                    }
                    Some(op::INVALID_SESSION) => {
                        return Err(PlatformError::Gateway("invalid session".into()));
                    }
                    Some(op::HEARTBEAT_ACK) => {}
                    other => tracing::debug!(op = ?other, "Ignoring gateway opcode"),
                }
            }
        }
    }
}

async fn send<S>(sink: &mut S, payload: &Value) -> Result<(), PlatformError>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    sink.send(Message::Text(payload.to_string().into()))
        .await
        .map_err(|e| PlatformError::Gateway(e.to_string()))
}

fn parse_payload(text: &str) -> Result<Value, PlatformError> {
    serde_json::from_str(text).map_err(|e| PlatformError::InvalidPayload(e.to_string()))
}

fn heartbeat_interval(hello: &Value) -> Result<u64, PlatformError> {
    if hello.get("op").and_then(Value::as_u64) != Some(op::HELLO) {
        return Err(PlatformError::Gateway(format!("expected hello, got {hello}")));
    }
    hello
        .get("d")
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(Value::as_u64)
        .ok_or_else(|| PlatformError::InvalidPayload("hello without heartbeat_interval".into()))
}

/// Turn a dispatch payload into an event for our guild, if it is one we
/// care about.
fn decode_dispatch(payload: &Value, guild_id: u64) -> Option<PlatformEvent> {
    let kind = payload.get("t")?.as_str()?;
    let data = payload.get("d")?;

    if kind == "READY" {
        let user = data
            .get("user")
            .and_then(|u| u.get("username"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return Some(PlatformEvent::Ready {
            user: user.to_string(),
        });
    }

    if data.get("guild_id").and_then(snowflake) != Some(guild_id) {
        return None;
    }

    match kind {
        "GUILD_MEMBER_ADD" => parse_member(data).map(PlatformEvent::MemberJoined),
        "MESSAGE_CREATE" => parse_message(data).map(PlatformEvent::MessageCreated),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ChannelId, MemberId};

    #[test]
    fn intents_value() {
        assert_eq!(INTENTS, 33283);
    }

    #[test]
    fn hello_interval() {
        let hello = json!({ "op": 10, "d": { "heartbeat_interval": 41250 } });
        assert_eq!(heartbeat_interval(&hello).unwrap(), 41250);
        assert!(heartbeat_interval(&json!({ "op": 0, "d": {} })).is_err());
    }

    #[test]
    fn decodes_member_add_for_our_guild() {
        let payload = json!({
            "op": 0, "s": 3, "t": "GUILD_MEMBER_ADD",
            "d": {
                "guild_id": "9",
                "user": { "id": "77", "username": "ada" },
                "roles": []
            }
        });
        match decode_dispatch(&payload, 9) {
            Some(PlatformEvent::MemberJoined(member)) => assert_eq!(member.id, MemberId(77)),
            other => panic!("expected MemberJoined, got {other:?}"),
        }
        assert!(decode_dispatch(&payload, 10).is_none());
    }

    #[test]
    fn decodes_message_create() {
        let payload = json!({
            "op": 0, "s": 4, "t": "MESSAGE_CREATE",
            "d": {
                "guild_id": "9",
                "channel_id": "5",
                "content": "CLVEN",
                "author": { "id": "77", "username": "ada" }
            }
        });
        match decode_dispatch(&payload, 9) {
            Some(PlatformEvent::MessageCreated(msg)) => {
                assert_eq!(msg.channel_id, ChannelId(5));
                assert_eq!(msg.content, "CLVEN");
                assert_eq!(msg.member_roles, None);
            }
            other => panic!("expected MessageCreated, got {other:?}"),
        }
    }

    #[test]
    fn ready_is_not_guild_filtered() {
        let payload = json!({
            "op": 0, "s": 1, "t": "READY",
            "d": { "user": { "id": "1", "username": "onboarder" }, "guilds": [] }
        });
        assert_eq!(
            decode_dispatch(&payload, 9),
            Some(PlatformEvent::Ready {
                user: "onboarder".into()
            })
        );
    }

    #[test]
    fn unrelated_dispatches_are_ignored() {
        let payload = json!({
            "op": 0, "s": 2, "t": "TYPING_START",
            "d": { "guild_id": "9", "user_id": "77" }
        });
        assert!(decode_dispatch(&payload, 9).is_none());
    }
}
