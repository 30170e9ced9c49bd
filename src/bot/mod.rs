//! Telegram bot front end
//!
//! Handles commands, the add-source conversation, the paginated removal menu
//! and free-form questions, which are forwarded to the RAG query queue.
//! Answers come back on the response queue and are delivered by
//! [`BotApp::run_responses`].

pub mod keyboards;
pub mod texts;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::models::{
    BotCommand, CallbackQuery, ChatRef, ChatType, InlineKeyboardMarkup, Message, NewChannel,
    RagResponse, ReplyMarkup, Update, UserChannel,
};
use crate::services::rag::RagHandle;
use crate::services::subscriptions::{AddOutcome, SubscriptionService};
use crate::services::telegram::{BotApi, TelegramError};
use crate::utils::text::parse_channel_link;
use keyboards::{removal_page, CallbackAction};

const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// How long in-flight updates may run after polling is cancelled
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-user conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    WaitingForSource,
}

/// Commands understood by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Licence,
    End,
    Add,
    Remove,
    GetChannels,
}

impl Command {
    /// Parse `/command` or `/command@botname`
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" => Some(Command::Start),
            "licence" => Some(Command::Licence),
            "end" => Some(Command::End),
            "add" => Some(Command::Add),
            "remove" => Some(Command::Remove),
            "get_channels" => Some(Command::GetChannels),
            _ => None,
        }
    }
}

fn command_list() -> Vec<BotCommand> {
    vec![
        BotCommand::new("/start", "Начать работу с ботом"),
        BotCommand::new("/add", "Добавить источник"),
        BotCommand::new("/remove", "Удалить источник"),
        BotCommand::new("/get_channels", "Список источников"),
        BotCommand::new("/end", "Удалить аккаунт"),
        BotCommand::new("/licence", "Информация о лицензии"),
    ]
}

pub struct BotApp {
    api: Arc<dyn BotApi>,
    subscriptions: SubscriptionService,
    rag: RagHandle,
    config: BotConfig,
    states: RwLock<HashMap<i64, ConversationState>>,
    bot_id: OnceCell<i64>,
}

impl BotApp {
    pub fn new(
        api: Arc<dyn BotApi>,
        subscriptions: SubscriptionService,
        rag: RagHandle,
        config: BotConfig,
    ) -> Self {
        Self {
            api,
            subscriptions,
            rag,
            config,
            states: RwLock::new(HashMap::new()),
            bot_id: OnceCell::new(),
        }
    }

    /// Look up the bot's own account
    pub async fn init(&self) -> Result<()> {
        let me = self.api.get_me().await.context("getMe failed")?;
        info!(
            "Bot authorized as @{}",
            me.username.as_deref().unwrap_or(&me.first_name)
        );
        let _ = self.bot_id.set(me.id);
        Ok(())
    }

    pub async fn state(&self, user_id: i64) -> Option<ConversationState> {
        self.states.read().await.get(&user_id).copied()
    }

    async fn set_state(&self, user_id: i64, state: Option<ConversationState>) {
        let mut states = self.states.write().await;
        match state {
            Some(state) => {
                states.insert(user_id, state);
            }
            None => {
                states.remove(&user_id);
            }
        }
    }

    /// Process one update. Errors are logged, never returned.
    pub async fn handle_update(&self, update: Update) {
        let result = if let Some(message) = update.message {
            self.handle_message(message).await
        } else if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await
        } else {
            Ok(())
        };

        if let Err(e) = result {
            error!("Failed to handle update {}: {:#}", update.update_id, e);
        }
    }

    async fn reply(&self, message: &Message, text: &str, markup: Option<ReplyMarkup>) -> Result<()> {
        self.api
            .send_message(message.chat.id, text, markup)
            .await
            .with_context(|| format!("Failed to send message to chat {}", message.chat.id))?;
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<()> {
        if message.chat.kind != ChatType::Private {
            debug!("Ignoring message from non-private chat {}", message.chat.id);
            return Ok(());
        }
        let Some(from) = message.from.clone() else {
            return Ok(());
        };

        if let Some(text) = message.text.as_deref() {
            if let Some(command) = Command::parse(text) {
                if command != Command::Add {
                    self.set_state(from.id, None).await;
                }
                return self.handle_command(command, &message).await;
            }

            if self.state(from.id).await == Some(ConversationState::WaitingForSource) {
                return self.handle_source(&message, text).await;
            }

            if text == texts::CANCEL_BUTTON {
                return self.cancel(&message).await;
            }
        }

        self.handle_question(&message).await
    }

    async fn handle_command(&self, command: Command, message: &Message) -> Result<()> {
        let Some(from) = message.from.as_ref() else {
            return Ok(());
        };

        match command {
            Command::Start => {
                info!("User {} started the bot", from.id);
                if let Err(e) = self.api.set_my_commands(&command_list()).await {
                    warn!("Failed to register bot commands: {}", e);
                }
                self.reply(
                    message,
                    &texts::welcome(&from.first_name),
                    Some(ReplyMarkup::remove()),
                )
                .await
            }
            Command::Licence => self.reply(message, texts::LICENCE, None).await,
            Command::End => {
                self.reply(message, texts::ACCOUNT_DELETED, Some(ReplyMarkup::remove()))
                    .await?;
                self.subscriptions.delete_account(from.id).await?;
                Ok(())
            }
            Command::Add => {
                self.set_state(from.id, Some(ConversationState::WaitingForSource))
                    .await;
                self.reply(
                    message,
                    texts::ASK_FOR_SOURCE,
                    Some(ReplyMarkup::single_button(texts::CANCEL_BUTTON)),
                )
                .await
            }
            Command::Remove => {
                let channels = self.channels_of(from.id).await?;
                if channels.is_empty() {
                    return self.reply(message, texts::NO_SOURCES, None).await;
                }
                let markup = removal_page(from.id, &channels, 1, self.config.items_per_page);
                self.reply(
                    message,
                    texts::CHOOSE_CHANNEL_TO_REMOVE,
                    Some(ReplyMarkup::Inline(markup)),
                )
                .await
            }
            Command::GetChannels => match self.subscriptions.user_channels(from.id).await? {
                None => self.reply(message, texts::NOT_REGISTERED, None).await,
                Some(channels) if channels.is_empty() => {
                    self.reply(message, texts::NO_SOURCES, None).await
                }
                Some(channels) => {
                    let list: Vec<(i64, String)> =
                        channels.into_iter().map(|c| (c.id, c.name)).collect();
                    self.reply(
                        message,
                        &texts::channel_list(&list),
                        Some(ReplyMarkup::remove()),
                    )
                    .await
                }
            },
        }
    }

    async fn cancel(&self, message: &Message) -> Result<()> {
        if let Some(from) = message.from.as_ref() {
            self.set_state(from.id, None).await;
        }
        self.reply(message, texts::ADD_CANCELLED, Some(ReplyMarkup::remove()))
            .await
    }

    async fn fail_source(&self, message: &Message, text: &str) -> Result<()> {
        self.reply(message, text, None).await?;
        self.cancel(message).await
    }

    async fn handle_source(&self, message: &Message, link: &str) -> Result<()> {
        if link == texts::CANCEL_BUTTON {
            return self.cancel(message).await;
        }
        let Some(from) = message.from.as_ref() else {
            return Ok(());
        };

        let Some(username) = parse_channel_link(link) else {
            return self.fail_source(message, texts::INVALID_LINK).await;
        };

        let chat = match self.api.get_chat(ChatRef::username(&username)).await {
            Ok(Some(chat)) => chat,
            Ok(None) => return self.fail_source(message, texts::CHANNEL_NOT_RESOLVED).await,
            Err(e) => {
                warn!("getChat failed for @{}: {}", username, e);
                return self.fail_source(message, texts::CHANNEL_NOT_RESOLVED).await;
            }
        };

        if chat.kind != ChatType::Channel {
            return self.fail_source(message, texts::NOT_A_CHANNEL).await;
        }

        let channel = NewChannel::new(
            chat.id,
            chat.display_name(),
            chat.username.clone().or(Some(username)),
        );

        match self
            .subscriptions
            .add_source(from.id, &from.first_name, &channel)
            .await
        {
            Ok(AddOutcome::Added) => {
                self.set_state(from.id, None).await;
                self.reply(
                    message,
                    &texts::source_added(link.trim()),
                    Some(ReplyMarkup::remove()),
                )
                .await
            }
            Ok(AddOutcome::AlreadySubscribed) => {
                self.fail_source(message, texts::ALREADY_SUBSCRIBED).await
            }
            Err(e) => {
                error!("Failed to add source for {}: {:#}", from.id, e);
                self.fail_source(message, texts::ADD_FAILED).await
            }
        }
    }

    async fn handle_question(&self, message: &Message) -> Result<()> {
        let Some(from) = message.from.as_ref() else {
            return Ok(());
        };
        let Some(text) = message.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            return self.reply(message, texts::TEXT_ONLY, None).await;
        };

        if self.bot_id.get() == Some(&from.id) {
            return self.reply(message, texts::OWN_MESSAGE, None).await;
        }

        let channels = match self.subscriptions.user_channels(from.id).await? {
            None => {
                warn!("User {} is not registered", from.id);
                return self.reply(message, texts::NOT_REGISTERED, None).await;
            }
            Some(channels) if channels.is_empty() => {
                warn!("User {} has no channels", from.id);
                return self.reply(message, texts::NO_SOURCES, None).await;
            }
            Some(channels) => channels,
        };

        let channel_ids = channels.into_iter().map(|c| c.id).collect();
        if let Err(e) = self.rag.query(from.id, text, channel_ids).await {
            error!("Failed to queue RAG request for {}: {:#}", from.id, e);
            return self.reply(message, texts::INTERNAL_ERROR, None).await;
        }
        self.reply(message, texts::REQUEST_ACCEPTED, None).await
    }

    async fn channels_of(&self, user_id: i64) -> Result<Vec<UserChannel>> {
        Ok(self
            .subscriptions
            .user_channels(user_id)
            .await?
            .unwrap_or_default())
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<()> {
        let result = self.dispatch_callback(&callback).await;
        if let Err(e) = self.api.answer_callback_query(&callback.id, None).await {
            warn!("Failed to answer callback query {}: {}", callback.id, e);
        }
        result
    }

    async fn dispatch_callback(&self, callback: &CallbackQuery) -> Result<()> {
        let Some(action) = callback.data.as_deref().and_then(CallbackAction::parse) else {
            debug!("Ignoring callback with data {:?}", callback.data);
            return Ok(());
        };
        let Some(message) = callback.message.as_ref() else {
            return Ok(());
        };

        match action {
            CallbackAction::Remove {
                user_id,
                channel_id,
            } => {
                if user_id != callback.from.id {
                    warn!(
                        "User {} tried to remove a source of user {}",
                        callback.from.id, user_id
                    );
                    return Ok(());
                }
                let text = match self.subscriptions.remove_source(user_id, channel_id).await {
                    Ok(true) => texts::channel_removed(channel_id),
                    Ok(false) => texts::channel_not_found(channel_id),
                    Err(e) => {
                        error!("Failed to remove source {} for {}: {:#}", channel_id, user_id, e);
                        texts::channel_not_found(channel_id)
                    }
                };
                self.edit_or_resend(message, &text, None).await
            }
            CallbackAction::Page(page) => {
                let channels = self.channels_of(callback.from.id).await?;
                if channels.is_empty() {
                    return self.edit_or_resend(message, texts::NO_SOURCES, None).await;
                }
                let markup =
                    removal_page(callback.from.id, &channels, page, self.config.items_per_page);
                self.edit_or_resend(message, texts::CHOOSE_CHANNEL_TO_REMOVE, Some(markup))
                    .await
            }
        }
    }

    /// Edit a bot message in place, falling back to delete and send
    async fn edit_or_resend(
        &self,
        message: &Message,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        match self
            .api
            .edit_message_text(message.chat.id, message.message_id, text, markup.clone())
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_modified() => Ok(()),
            Err(e) => {
                debug!("Edit failed ({}), sending a new message", e);
                if let Err(e) = self
                    .api
                    .delete_message(message.chat.id, message.message_id)
                    .await
                {
                    debug!("Delete failed: {}", e);
                }
                self.reply(message, text, markup.map(ReplyMarkup::Inline))
                    .await
            }
        }
    }

    /// Long-poll for updates until cancelled
    ///
    /// Updates are handled in spawned tasks so a slow handler does not hold up
    /// other users. Updates from the same sender within a batch stay in order.
    pub async fn run_polling(self: Arc<Self>, cancel: CancellationToken) {
        let mut offset = 0i64;
        let mut backoff = Duration::from_secs(1);
        let mut tasks = JoinSet::new();
        info!("Bot polling started");

        loop {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!("Update handler task failed: {}", e);
                }
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.api.get_updates(offset, self.config.poll_timeout_secs) => result,
            };

            match result {
                Ok(updates) => {
                    backoff = Duration::from_secs(1);
                    if let Some(last) = updates.iter().map(|u| u.update_id).max() {
                        offset = offset.max(last + 1);
                    }
                    for batch in group_by_sender(updates) {
                        let app = self.clone();
                        tasks.spawn(async move {
                            for update in batch {
                                app.handle_update(update).await;
                            }
                        });
                    }
                }
                Err(e) => {
                    let delay = match &e {
                        TelegramError::Api {
                            retry_after: Some(secs),
                            ..
                        } => Duration::from_secs(*secs),
                        _ => backoff,
                    };
                    warn!("getUpdates failed: {}. Retrying in {:?}", e, delay);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        let drain = async { while tasks.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Update handlers still running after {:?}, aborting", DRAIN_TIMEOUT);
            tasks.abort_all();
        }
        info!("Bot polling stopped");
    }

    /// Send one RAG answer to its user
    pub async fn deliver(&self, response: &RagResponse) -> Result<()> {
        self.api
            .send_message(response.user_id, &texts::escape_html(&response.text), None)
            .await?;
        Ok(())
    }

    /// Deliver RAG answers until cancelled or the queue closes
    pub async fn run_responses(
        self: Arc<Self>,
        mut responses: mpsc::Receiver<RagResponse>,
        cancel: CancellationToken,
    ) {
        loop {
            let response = tokio::select! {
                _ = cancel.cancelled() => break,
                response = responses.recv() => match response {
                    Some(response) => response,
                    None => break,
                },
            };

            info!("Got response from RAG for {}", response.user_id);
            if let Err(e) = self.deliver(&response).await {
                error!("Failed to send message to {}: {:#}", response.user_id, e);
            }
        }
        info!("Bot response loop stopped");
    }
}

fn sender_of(update: &Update) -> i64 {
    if let Some(message) = &update.message {
        message.from.as_ref().map_or(message.chat.id, |user| user.id)
    } else if let Some(callback) = &update.callback_query {
        callback.from.id
    } else {
        0
    }
}

/// Split a batch into per-sender runs, keeping arrival order within each
fn group_by_sender(updates: Vec<Update>) -> Vec<Vec<Update>> {
    let mut groups: Vec<(i64, Vec<Update>)> = Vec::new();
    for update in updates {
        let sender = sender_of(&update);
        match groups.iter_mut().find(|(id, _)| *id == sender) {
            Some((_, group)) => group.push(update),
            None => groups.push((sender, vec![update])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

/// Spawn the polling and response delivery loops
pub fn start_bot(
    app: Arc<BotApp>,
    responses: mpsc::Receiver<RagResponse>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(app.clone().run_polling(cancel.clone())),
        tokio::spawn(app.run_responses(responses, cancel)),
    ]
}
