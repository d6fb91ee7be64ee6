pub mod conversation;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::types::update::Message;
use grammers_client::{Client, InputMessage};
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::logging::LogFile;
use conversation::{Conversation, SearchServices};

// Replies buffered per conversation; extra messages are dropped.
const REPLY_QUEUE: usize = 8;

const USAGE: &str = "Send me a keyword and I will look for public groups and channels \
matching it, then scan their recent media for captions or file names containing it.\n\n\
/logs - get the bot's log file";

const GENERIC_ERROR: &str = "❌ Something went wrong while searching. Please try again.";

#[derive(Debug, Error)]
pub enum BotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Telegram error: {0}")]
    Telegram(String),
}

/// Who a conversation belongs to: a user in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requester {
    pub chat_id: i64,
    pub user_id: i64,
}

/// Outgoing side of the bot identity.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send plain text, returning the new message's id.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, BotError>;
    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), BotError>;
    async fn send_file(&self, chat_id: i64, path: &Path, caption: &str) -> Result<(), BotError>;
}

/// Messenger backed by the bot client.
pub struct GrammersMessenger {
    client: Client,
}

impl GrammersMessenger {
    pub fn new(client: Client) -> Self {
        GrammersMessenger { client }
    }
}

/// Bot API style chat id to an input peer. Bots may address users and
/// chats they have seen with a zero access hash.
fn input_peer(chat_id: i64) -> tl::enums::InputPeer {
    if chat_id > 0 {
        tl::enums::InputPeer::User(tl::types::InputPeerUser {
            user_id: chat_id,
            access_hash: 0,
        })
    } else if chat_id < -1_000_000_000_000 {
        // supergroup / channel: bot_api_dialog_id = -(1000000000000 + bare_id)
        tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
            channel_id: -chat_id - 1_000_000_000_000,
            access_hash: 0,
        })
    } else {
        tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id: -chat_id })
    }
}

fn plain_message(text: &str) -> InputMessage {
    InputMessage::new().text(text)
}

#[async_trait]
impl Messenger for GrammersMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i32, BotError> {
        let sent = self
            .client
            .send_message(input_peer(chat_id), plain_message(text))
            .await
            .map_err(|e| BotError::Telegram(format!("Failed to send message: {}", e)))?;
        Ok(sent.id())
    }

    async fn edit_text(&self, chat_id: i64, message_id: i32, text: &str) -> Result<(), BotError> {
        self.client
            .edit_message(input_peer(chat_id), message_id, plain_message(text))
            .await
            .map_err(|e| BotError::Telegram(format!("Failed to edit message: {}", e)))
    }

    async fn send_file(&self, chat_id: i64, path: &Path, caption: &str) -> Result<(), BotError> {
        let uploaded = self.client.upload_file(path).await?;
        self.client
            .send_message(input_peer(chat_id), plain_message(caption).document(uploaded))
            .await
            .map_err(|e| BotError::Telegram(format!("Failed to send file: {}", e)))?;
        Ok(())
    }
}

/// An incoming text message from a user.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub chat_id: i64,
    pub user_id: i64,
    pub text: String,
}

/// Extract the parts the dispatcher needs from a bot update.
pub fn inbound_from(message: &Message) -> Option<Inbound> {
    let text = message.text();
    if text.is_empty() {
        return None;
    }
    let Some(sender) = message.sender() else {
        log::warn!("Message without sender");
        return None;
    };
    Some(Inbound {
        chat_id: message.peer_id().bot_api_dialog_id(),
        user_id: sender.id().bot_api_dialog_id(),
        text: text.to_string(),
    })
}

/// Routes inbound messages: commands are answered directly, a keyword
/// from a requester with a live conversation goes to that conversation,
/// any other keyword starts a new one.
pub struct Dispatcher {
    services: Arc<SearchServices>,
    messenger: Arc<dyn Messenger>,
    log_file: Arc<LogFile>,
    conversations: HashMap<Requester, mpsc::Sender<String>>,
}

impl Dispatcher {
    pub fn new(
        services: Arc<SearchServices>,
        messenger: Arc<dyn Messenger>,
        log_file: Arc<LogFile>,
    ) -> Self {
        Dispatcher {
            services,
            messenger,
            log_file,
            conversations: HashMap::new(),
        }
    }

    /// Requesters with a conversation still running.
    pub fn active_conversations(&mut self) -> usize {
        self.conversations.retain(|_, tx| !tx.is_closed());
        self.conversations.len()
    }

    pub async fn dispatch(&mut self, inbound: Inbound) {
        let text = inbound.text.trim();
        if text.is_empty() {
            return;
        }

        if let Some(command) = text.strip_prefix('/') {
            self.handle_command(inbound.chat_id, command);
            return;
        }

        let requester = Requester {
            chat_id: inbound.chat_id,
            user_id: inbound.user_id,
        };
        self.conversations.retain(|_, tx| !tx.is_closed());

        if let Some(tx) = self.conversations.get(&requester) {
            if let Err(e) = tx.try_send(text.to_string()) {
                log::warn!("Dropping message from {:?}: {}", requester, e);
            }
            return;
        }

        log::info!("New search from {:?}: '{}'", requester, text);
        let (tx, rx) = mpsc::channel(REPLY_QUEUE);
        self.conversations.insert(requester, tx);

        let conversation = Conversation::new(
            Arc::clone(&self.services),
            Arc::clone(&self.messenger),
            requester,
            text,
            rx,
        );
        let handle = tokio::spawn(conversation.run());
        let messenger = Arc::clone(&self.messenger);
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(_)) => return,
                Ok(Err(e)) => log::error!("Conversation with {:?} failed: {}", requester, e),
                Err(e) if e.is_panic() => {
                    log::error!("Conversation with {:?} panicked: {}", requester, e)
                }
                Err(e) => {
                    log::warn!("Conversation with {:?} cancelled: {}", requester, e);
                    return;
                }
            }
            if let Err(e) = messenger.send_text(requester.chat_id, GENERIC_ERROR).await {
                log::error!("Failed to send error notice to {:?}: {}", requester, e);
            }
        });
    }

    /// Answer a command in its own task so slow uploads never hold up
    /// routing for other requesters.
    fn handle_command(&self, chat_id: i64, command: &str) {
        // "/logs@SomeBot args" -> "logs"
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or("")
            .split('@')
            .next()
            .unwrap_or("")
            .to_string();
        if !matches!(name.as_str(), "logs" | "start" | "help") {
            log::debug!("Ignoring command /{} from {}", name, chat_id);
            return;
        }

        let messenger = Arc::clone(&self.messenger);
        let log_file = Arc::clone(&self.log_file);
        tokio::spawn(async move {
            let result = if name == "logs" {
                send_logs(messenger.as_ref(), &log_file, chat_id).await
            } else {
                messenger.send_text(chat_id, USAGE).await.map(|_| ())
            };
            if let Err(e) = result {
                log::error!("Command /{} for {} failed: {}", name, chat_id, e);
            }
        });
    }
}

async fn send_logs(
    messenger: &dyn Messenger,
    log_file: &LogFile,
    chat_id: i64,
) -> Result<(), BotError> {
    log_file.flush();
    let path = log_file.path();
    if !path.exists() {
        messenger.send_text(chat_id, "No logs yet.").await?;
        return Ok(());
    }
    log::info!("Sending logs to {}", chat_id);
    messenger.send_file(chat_id, path, "📄 Logs").await
}
