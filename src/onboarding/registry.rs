//! Registry of members currently being onboarded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::platform::MemberId;

/// Process-wide set of members with a workflow in flight.
///
/// Entry and exit are single critical sections that never span an await,
/// so two interleaved tasks cannot both acquire the same member.
#[derive(Debug, Default)]
pub struct ActiveMembers {
    members: Mutex<HashSet<MemberId>>,
}

impl ActiveMembers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<MemberId>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check-and-insert. Returns `None` if the member is already active.
    pub fn try_acquire(self: &Arc<Self>, member: MemberId) -> Option<ActiveGuard> {
        if !self.lock().insert(member) {
            return None;
        }
        Some(ActiveGuard {
            registry: Arc::clone(self),
            member,
        })
    }

    pub fn contains(&self, member: MemberId) -> bool {
        self.lock().contains(&member)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, member: MemberId) {
        self.lock().remove(&member);
    }
}

/// Holds a member's slot; dropping it releases the slot on every exit path,
/// including panics and task cancellation.
#[derive(Debug)]
pub struct ActiveGuard {
    registry: Arc<ActiveMembers>,
    member: MemberId,
}

impl ActiveGuard {
    pub fn member(&self) -> MemberId {
        self.member
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.registry.release(self.member);
    }
}
