//! Telegram bot handlers.

use crate::db::Database;
use crate::notifier::{escape_html, format_alert_message, NotificationSink, NotifyError};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::{debug, info};
use watchlist_core::{AlertNotice, TransactionAlert, User, WatchlistItem};

/// Alerts listed by /alerts.
const RECENT_ALERTS: i64 = 5;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
}

/// Bot commands.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Show this chat's id for linking your account")]
    Start,
    #[command(description = "List watched wallets")]
    Watchlist,
    #[command(description = "Show recent alerts")]
    Alerts,
    #[command(description = "Show help")]
    Help,
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    db: Database,
}

impl TelegramBot {
    /// Create a new bot with the given token.
    pub fn new(token: &str, db: Database) -> Self {
        let bot = Bot::new(token);
        Self { bot, db }
    }

    /// Send an HTML message to a chat.
    pub async fn send_html(&self, chat_id: &str, message: &str) -> Result<(), NotifyError> {
        let id: i64 = chat_id
            .trim()
            .parse()
            .map_err(|_| NotifyError::InvalidChatId(chat_id.to_string()))?;
        self.bot
            .send_message(ChatId(id), message)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| NotifyError::Telegram(e.to_string()))?;
        Ok(())
    }

    /// Run the bot command handler.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move { this.handle_command(bot, msg, cmd).await }
            },
        );

        info!("Telegram command handler running");
        Dispatcher::builder(bot, handler)
            .build()
            .dispatch()
            .await;
    }

    async fn handle_command(
        &self,
        bot: Bot,
        msg: Message,
        cmd: Command,
    ) -> Result<(), TelegramError> {
        let chat_id = msg.chat.id.to_string();
        debug!(chat_id = %chat_id, command = ?cmd, "Telegram command");
        let user = self.db.find_user_by_chat_id(&chat_id).await?;

        let text = match (cmd, user) {
            (Command::Help, _) => Command::descriptions().to_string(),
            (Command::Start, Some(user)) => start_message(&chat_id, Some(&user)),
            (Command::Start, None) => start_message(&chat_id, None),
            (_, None) => "This chat is not linked to an account yet. Use /start to get your chat id."
                .to_string(),
            (Command::Watchlist, Some(user)) => {
                let items = self.db.list_items_for_user(&user.id).await?;
                watchlist_message(&items)
            }
            (Command::Alerts, Some(user)) => {
                let alerts = self.db.recent_alerts_for_user(&user.id, RECENT_ALERTS).await?;
                let total = self.db.count_alerts_for_user(&user.id).await?;
                alerts_message(&alerts, total)
            }
        };

        bot.send_message(msg.chat.id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramBot {
    async fn notify(&self, handle: &str, notice: &AlertNotice) -> Result<(), NotifyError> {
        self.send_html(handle, &format_alert_message(notice)).await
    }
}

fn start_message(chat_id: &str, user: Option<&User>) -> String {
    match user {
        Some(user) => format!(
            "Welcome back!\n\nThis chat receives alerts for account <code>{}</code>.\n\
             Use /watchlist to see watched wallets.",
            user.id
        ),
        None => format!(
            "Welcome to Watchlist Alerts!\n\n\
             Your chat id is <code>{}</code>.\n\
             Enter it in your account settings to receive transaction alerts here.",
            chat_id
        ),
    }
}

fn watchlist_message(items: &[WatchlistItem]) -> String {
    if items.is_empty() {
        return "You are not watching any wallets.".to_string();
    }

    let mut text = format!("<b>Watched wallets ({})</b>\n", items.len());
    for item in items {
        text.push_str(&format!("\n• {} <code>{}</code>", item.chain.as_str(), item.address));
        if let Some(symbol) = &item.token_symbol {
            text.push_str(&format!(" [{}]", escape_html(symbol)));
        }
        if let Some(label) = &item.label {
            text.push_str(&format!(" {}", escape_html(label)));
        }
    }
    text
}

fn alerts_message(alerts: &[TransactionAlert], total: i64) -> String {
    if alerts.is_empty() {
        return "No alerts yet.".to_string();
    }

    let mut text = format!("<b>Recent alerts</b> ({} of {})\n", alerts.len(), total);
    for alert in alerts {
        text.push_str(&format!(
            "\n• {} {} on {} <a href=\"{}\">tx</a> {}",
            alert.created_at.format("%m-%d %H:%M"),
            alert.alert_type,
            alert.chain.as_str(),
            alert.chain.explorer_tx_url(&alert.transaction_hash),
            if alert.is_read { "" } else { "🆕" }
        ));
    }
    text
}
