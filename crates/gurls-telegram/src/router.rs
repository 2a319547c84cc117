use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::Me};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gurls_core::{
    backend::LinkBackend,
    config::Config,
    conversation::ConversationStore,
    dispatch::{DispatchLoop, Pipeline},
    domain::{ChatId, UserId},
    formatting::Formatter,
    messaging::{
        port::MessagingPort,
        types::{InboundEvent, IncomingUpdate},
    },
};

use crate::TelegramMessenger;

/// Updates buffered between the Telegram poller and the dispatch loop.
const INBOUND_QUEUE: usize = 1024;

const SHUTDOWN_RETRY: Duration = Duration::from_millis(100);

/// Classify raw message text: `/...` is a command, anything else free text.
pub fn event_from_text(text: &str) -> InboundEvent {
    if text.starts_with('/') {
        InboundEvent::parse_command(text)
    } else {
        InboundEvent::Text(text.to_string())
    }
}

fn update_from_message(msg: &Message) -> Option<IncomingUpdate> {
    let text = msg.text()?;
    let user = msg.from()?;
    Some(IncomingUpdate {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        event: event_from_text(text),
    })
}

fn update_from_callback(q: &CallbackQuery) -> Option<IncomingUpdate> {
    let chat = q.message.as_ref()?.chat.id;
    Some(IncomingUpdate {
        chat_id: ChatId(chat.0),
        user_id: UserId(q.from.id.0 as i64),
        event: InboundEvent::Callback {
            callback_id: q.id.clone(),
            data: q.data.clone().unwrap_or_default(),
        },
    })
}

async fn forward(tx: &mpsc::Sender<IncomingUpdate>, update: IncomingUpdate) {
    let user_id = update.user_id.0;
    if tx.send(update).await.is_err() {
        warn!(user_id, "dispatch loop closed, dropping update");
    }
}

async fn handle_message(msg: Message, tx: mpsc::Sender<IncomingUpdate>) -> ResponseResult<()> {
    match update_from_message(&msg) {
        Some(update) => forward(&tx, update).await,
        None => debug!(chat_id = msg.chat.id.0, "ignoring non-text message"),
    }
    Ok(())
}

async fn handle_callback(
    q: CallbackQuery,
    tx: mpsc::Sender<IncomingUpdate>,
    messenger: Arc<dyn MessagingPort>,
) -> ResponseResult<()> {
    match update_from_callback(&q) {
        Some(update) => forward(&tx, update).await,
        // No originating chat to reply into; still clear the button spinner.
        None => acknowledge(messenger.as_ref(), &q.id, UserId(q.from.id.0 as i64)).await,
    }
    Ok(())
}

/// Answer a callback query, logging (not propagating) a transport failure.
async fn acknowledge(messenger: &dyn MessagingPort, callback_id: &str, user_id: UserId) {
    if let Err(e) = messenger.answer_callback_query(callback_id, None).await {
        warn!(user_id = user_id.0, error = %e, "failed to answer callback");
    }
}

/// Long-poll Telegram until `shutdown` fires, then drain the dispatch loop.
pub async fn run_polling(
    cfg: Arc<Config>,
    backend: Arc<dyn LinkBackend>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_token.clone());

    let me: Me = bot.get_me().await?;
    info!(username = %me.username(), "telegram bot authorized");

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(ConversationStore::new()),
        backend,
        messenger.clone(),
        Formatter::new(cfg.base_url.clone()),
    ));

    let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
    let dispatch = tokio::spawn(DispatchLoop::new(pipeline).run(rx, shutdown.clone()));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_message().endpoint(handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![tx, messenger])
        .build();

    let token = dispatcher.shutdown_token();
    let stop = shutdown.clone();
    let stopper = tokio::spawn(async move {
        stop.cancelled().await;
        info!("stopping telegram polling");
        // The dispatcher refuses to stop until it has started polling.
        loop {
            match token.shutdown() {
                Ok(done) => return done.await,
                Err(e) => {
                    debug!(error = %e, "dispatcher not running yet");
                    tokio::time::sleep(SHUTDOWN_RETRY).await;
                }
            }
        }
    });

    dispatcher.dispatch().await;
    stopper.abort();

    // The dispatcher (and its sender) is gone; let the loop finish.
    drop(dispatcher);
    shutdown.cancel();
    dispatch.await?;

    info!("telegram polling stopped");
    Ok(())
}
