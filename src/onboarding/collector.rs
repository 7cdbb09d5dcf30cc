//! Response collector — asks a member a question and waits for their next
//! message in that channel.
//!
//! Each outstanding question is a oneshot sender parked in a map keyed by
//! member id. The event handler calls [`ResponseCollector::dispatch`] for
//! every inbound message; the first matching message takes the sender out of
//! the map and resolves the wait. A wait that runs out of time removes its
//! own entry so a late message is treated as ordinary chat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::CollectorError;
use crate::platform::{ChannelId, Guild, InboundMessage, MemberId};

use super::prompts;

/// An outstanding question.
struct PendingReply {
    channel: ChannelId,
    /// Identifies the `ask` call that registered this entry.
    ticket: u64,
    reply_tx: oneshot::Sender<String>,
}

pub struct ResponseCollector {
    guild: Arc<dyn Guild>,
    wait: Duration,
    next_ticket: AtomicU64,
    pending: Mutex<HashMap<MemberId, PendingReply>>,
}

impl ResponseCollector {
    pub fn new(guild: Arc<dyn Guild>, wait: Duration) -> Self {
        Self {
            guild,
            wait,
            next_ticket: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MemberId, PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask `member` a question in `channel`.
    ///
    /// Resolves to the trimmed reply, or `None` when nothing arrived within
    /// the wait window. Only one question per member may be outstanding.
    pub async fn ask(
        &self,
        member: MemberId,
        channel: ChannelId,
        question: &str,
    ) -> Result<Option<String>, CollectorError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        // Registered before the question goes out so a fast reply can't
        // slip past.
        {
            let mut pending = self.lock();
            if pending
                .get(&member)
                .is_some_and(|existing| !existing.reply_tx.is_closed())
            {
                return Err(CollectorError::AlreadyWaiting { member });
            }
            pending.insert(
                member,
                PendingReply {
                    channel,
                    ticket,
                    reply_tx,
                },
            );
        }

        if let Err(e) = self
            .guild
            .send_message(channel, &prompts::question(member, question))
            .await
        {
            self.forget(member, ticket);
            return Err(e.into());
        }

        match tokio::time::timeout(self.wait, reply_rx).await {
            Ok(Ok(answer)) => Ok(Some(answer)),
            Ok(Err(_)) => {
                self.forget(member, ticket);
                Ok(None)
            }
            Err(_) => {
                self.forget(member, ticket);
                tracing::debug!(%member, wait = ?self.wait, "No reply within wait window");
                Ok(None)
            }
        }
    }

    /// Offer an inbound message. Returns `true` if it answered an
    /// outstanding question.
    pub fn dispatch(&self, message: &InboundMessage) -> bool {
        let mut pending = self.lock();
        match pending.get(&message.author.id) {
            Some(entry) if entry.channel == message.channel_id => {}
            _ => return false,
        }
        let Some(entry) = pending.remove(&message.author.id) else {
            return false;
        };
        drop(pending);
        entry
            .reply_tx
            .send(message.content.trim().to_string())
            .is_ok()
    }

    /// Whether `member` has a question waiting for an answer.
    pub fn is_waiting(&self, member: MemberId) -> bool {
        self.lock()
            .get(&member)
            .is_some_and(|entry| !entry.reply_tx.is_closed())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Remove the entry registered by `ticket`, leaving newer ones alone.
    fn forget(&self, member: MemberId, ticket: u64) {
        let mut pending = self.lock();
        if pending.get(&member).is_some_and(|entry| entry.ticket == ticket) {
            pending.remove(&member);
        }
    }
}
