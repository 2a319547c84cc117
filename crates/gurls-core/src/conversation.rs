//! Per-user conversation state.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::UserId;

/// What free-text input the bot expects next from a user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    /// The user pressed "Use Custom Alias" and must send an alias.
    AwaitingCustomAlias,
    /// The alias was accepted; the next text must contain the URL for it.
    AwaitingUrlForAlias(String),
}

/// Process-wide map from user to conversation state (no persistence).
///
/// Each user has their own lock; the outer map lock is only held while the
/// per-user entry is looked up, so two users never block each other. A
/// missing entry reads as [`ConversationState::Idle`].
#[derive(Default)]
pub struct ConversationStore {
    inner: Mutex<HashMap<UserId, Arc<Mutex<ConversationState>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access to one user's state until the guard is dropped.
    pub async fn lock(&self, user: UserId) -> OwnedMutexGuard<ConversationState> {
        let slot = {
            let mut map = self.inner.lock().await;
            map.entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(ConversationState::Idle)))
                .clone()
        };
        slot.lock_owned().await
    }

    /// Current state (a copy). Waits for any in-progress update of the same user.
    pub async fn get(&self, user: UserId) -> ConversationState {
        let slot = { self.inner.lock().await.get(&user).cloned() };
        match slot {
            Some(slot) => slot.lock().await.clone(),
            None => ConversationState::Idle,
        }
    }

    /// Overwrite a user's state wholesale.
    pub async fn set(&self, user: UserId, state: ConversationState) {
        *self.lock(user).await = state;
    }

    pub async fn reset(&self, user: UserId) {
        self.set(user, ConversationState::Idle).await;
    }

    /// Drop entries that are idle and not referenced outside the map.
    ///
    /// Slots are only cloned out under the map lock, so a count of one here
    /// means no caller is between fetching the slot and locking it.
    pub async fn prune_idle(&self) -> usize {
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => *state != ConversationState::Idle,
                Err(_) => true,
            }
        });
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
