//! Dispatch: Router → Backend → Formatter → transport, one event at a time per user.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    backend::{BackendError, LinkBackend},
    conversation::ConversationStore,
    domain::{ChatId, UserId},
    formatting::{Formatter, MSG_INTERNAL_ERROR},
    messaging::{
        port::MessagingPort,
        types::{InboundEvent, IncomingUpdate, OutgoingMessage},
    },
    outcome::{Failure, Outcome},
    router::{route, Intent},
    Result,
};

/// A per-user worker exits after this long without events.
const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// The full per-event pipeline. Shared by all user workers.
pub struct Pipeline {
    store: Arc<ConversationStore>,
    backend: Arc<dyn LinkBackend>,
    messenger: Arc<dyn MessagingPort>,
    formatter: Formatter,
}

impl Pipeline {
    pub fn new(
        store: Arc<ConversationStore>,
        backend: Arc<dyn LinkBackend>,
        messenger: Arc<dyn MessagingPort>,
        formatter: Formatter,
    ) -> Self {
        Self {
            store,
            backend,
            messenger,
            formatter,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Run one event to completion: route (mutating state), execute, reply.
    pub async fn process(&self, update: IncomingUpdate) -> Result<()> {
        let IncomingUpdate {
            chat_id,
            user_id,
            event,
        } = update;

        if let InboundEvent::Callback { callback_id, .. } = &event {
            if let Err(e) = self.messenger.answer_callback_query(callback_id, None).await {
                warn!(user_id = user_id.0, error = %e, "failed to answer callback");
            }
        }

        // State is only touched here; the guard is released before any network I/O.
        let intent = {
            let mut state = self.store.lock(user_id).await;
            let routed = route(&state, &event, user_id, Utc::now());
            debug!(user_id = user_id.0, intent = ?routed.intent, next = ?routed.next_state, "routed");
            *state = routed.next_state;
            routed.intent
        };

        let Some(outcome) = self.execute(user_id, intent).await else {
            return Ok(());
        };

        let msg = self.formatter.render(&outcome);
        self.messenger.send_message(chat_id, &msg).await?;
        Ok(())
    }

    /// Turn an intent into an outcome, calling the backend at most once.
    pub async fn execute(&self, user_id: UserId, intent: Intent) -> Option<Outcome> {
        let outcome = match intent {
            Intent::Welcome => Outcome::Welcome,
            Intent::CreateLinkPrompt => Outcome::CreateLinkPrompt,
            Intent::CustomAliasPrompt => Outcome::CustomAliasPrompt,
            Intent::AliasAccepted(alias) => Outcome::UrlForAliasPrompt { alias },
            Intent::ShortenHint => Outcome::ShortenHint,
            Intent::UnknownCommand => Outcome::UnknownCommand,
            Intent::Invalid(v) => v.into(),
            Intent::Ignore => return None,

            Intent::Shorten(req) => {
                let alias = req.custom_alias.clone();
                match self.backend.create_link(req).await {
                    Ok(link) => {
                        info!(user_id = user_id.0, alias = %link.alias, "link created");
                        Outcome::Created(link)
                    }
                    Err(BackendError::AliasConflict) => match alias {
                        Some(alias) => Failure::AliasConflict { alias }.into(),
                        None => {
                            error!(user_id = user_id.0, "alias conflict without a requested alias");
                            Failure::Internal.into()
                        }
                    },
                    Err(e) => failure_from(e, "CreateLink", None),
                }
            }

            Intent::Stats(alias) => match self.backend.get_stats(&alias).await {
                Ok(stats) => Outcome::Stats { alias, stats },
                Err(e) => failure_from(e, "GetLinkStats", Some(alias)),
            },

            Intent::Delete(alias) => match self.backend.delete_link(&alias).await {
                Ok(()) => {
                    info!(user_id = user_id.0, alias = %alias, "link deleted");
                    Outcome::Deleted { alias }
                }
                Err(e) => failure_from(e, "DeleteLink", Some(alias)),
            },

            Intent::MyLinks => match self.backend.list_user_links(user_id).await {
                Ok(links) => Outcome::LinkList(links),
                Err(e) => failure_from(e, "ListUserLinks", None),
            },
        };
        Some(outcome)
    }

    async fn send_internal_error(&self, chat_id: ChatId) {
        let msg = OutgoingMessage::text(MSG_INTERNAL_ERROR);
        if let Err(e) = self.messenger.send_message(chat_id, &msg).await {
            warn!(chat_id = chat_id.0, error = %e, "failed to report internal error");
        }
    }
}

fn failure_from(err: BackendError, op: &str, alias: Option<String>) -> Outcome {
    match (err, alias) {
        (BackendError::NotFound, Some(alias)) => Failure::NotFound { alias }.into(),
        (BackendError::Unavailable(reason), alias) => {
            warn!(op, alias = alias.as_deref().unwrap_or(""), %reason, "backend unavailable");
            Failure::Unavailable.into()
        }
        (other, alias) => {
            error!(op, alias = alias.as_deref().unwrap_or(""), error = %other, "unexpected backend result");
            Failure::Internal.into()
        }
    }
}

/// Consumes the inbound event stream.
///
/// Each user gets a FIFO worker, so one conversation is processed strictly in
/// arrival order while different users proceed concurrently.
pub struct DispatchLoop {
    pipeline: Arc<Pipeline>,
    idle_timeout: Duration,
}

impl DispatchLoop {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            idle_timeout: WORKER_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Run until the stream ends or `shutdown` fires.
    ///
    /// On shutdown no new events are accepted; every worker finishes the
    /// event it is processing (bounded by the backend timeout) and exits.
    pub async fn run(self, mut events: mpsc::Receiver<IncomingUpdate>, shutdown: CancellationToken) {
        let mut queues: HashMap<UserId, UserQueue> = HashMap::new();
        let mut workers = JoinSet::new();

        info!("dispatch loop started");
        loop {
            let update = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = events.recv() => match next {
                    Some(update) => update,
                    None => break,
                },
            };

            while let Some(res) = workers.try_join_next() {
                log_worker_exit(res);
            }

            let user = update.user_id;
            let (update, predecessor) = match queues.get(&user) {
                Some(queue) => match queue.tx.send(update) {
                    Ok(()) => continue,
                    // Worker went idle and closed its queue; it may still be
                    // finishing events that slipped in before the close.
                    Err(mpsc::error::SendError(update)) => (update, Some(queue.done.clone())),
                },
                None => (update, None),
            };

            queues.retain(|_, q| !(q.tx.is_closed() && q.done.is_cancelled()));
            let (tx, rx) = mpsc::unbounded_channel();
            // The receiver is alive until the worker is spawned below.
            let _ = tx.send(update);
            let done = CancellationToken::new();
            workers.spawn(worker(
                self.pipeline.clone(),
                user,
                rx,
                shutdown.clone(),
                self.idle_timeout,
                predecessor,
                done.clone(),
            ));
            queues.insert(user, UserQueue { tx, done });
        }

        info!(workers = workers.len(), "dispatch loop stopping");
        drop(queues);
        while let Some(res) = workers.join_next().await {
            log_worker_exit(res);
        }
        info!("dispatch loop stopped");
    }
}

/// Inbound half of a user's worker plus a token cancelled when it exits.
struct UserQueue {
    tx: mpsc::UnboundedSender<IncomingUpdate>,
    done: CancellationToken,
}

fn log_worker_exit(res: std::result::Result<(), JoinError>) {
    if let Err(e) = res {
        error!(error = %e, "user worker terminated abnormally");
    }
}

/// Process one user's queue in order.
///
/// A replacement worker waits for `predecessor` to exit first, so events
/// drained by a retiring worker are never overtaken.
async fn worker(
    pipeline: Arc<Pipeline>,
    user: UserId,
    mut rx: mpsc::UnboundedReceiver<IncomingUpdate>,
    shutdown: CancellationToken,
    idle_timeout: Duration,
    predecessor: Option<CancellationToken>,
    done: CancellationToken,
) {
    let _done = done.drop_guard();

    if let Some(prev) = predecessor {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            _ = prev.cancelled() => {}
        }
    }

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            next = tokio::time::timeout(idle_timeout, rx.recv()) => next,
        };

        match next {
            Ok(Some(update)) => handle_one(&pipeline, update).await,
            Ok(None) => return,
            Err(_) => {
                // Idle: refuse new sends, then finish whatever slipped in.
                rx.close();
                while let Ok(update) = rx.try_recv() {
                    if shutdown.is_cancelled() {
                        return;
                    }
                    handle_one(&pipeline, update).await;
                }
                let pruned = pipeline.store().prune_idle().await;
                debug!(user_id = user.0, pruned, "user worker idle, exiting");
                return;
            }
        }
    }
}

/// Run one pipeline in its own task so a panic cannot take the worker down.
async fn handle_one(pipeline: &Arc<Pipeline>, update: IncomingUpdate) {
    let chat_id = update.chat_id;
    let user_id = update.user_id;

    let task = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.process(update).await })
    };

    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(user_id = user_id.0, chat_id = chat_id.0, error = %e, "failed to handle update");
            pipeline.send_internal_error(chat_id).await;
        }
        Err(e) => {
            error!(user_id = user_id.0, chat_id = chat_id.0, error = %e, "update handler panicked");
            pipeline.send_internal_error(chat_id).await;
        }
    }
}
