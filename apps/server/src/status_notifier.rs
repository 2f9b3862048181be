//! Operator status notifications.
//!
//! Sends Telegram notifications to an operator chat:
//! - Cycle summaries that recorded errors
//! - Monitor start and stop

use crate::config::TelegramSettings;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use watchlist_alerts::escape_html;
use watchlist_core::{CycleErrorKind, RunSummary};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Errors listed individually in a cycle report.
const MAX_LISTED_ERRORS: usize = 5;

/// Status event types for notification.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    MonitorStarted,
    MonitorStopping,
    /// A cycle finished. Only reported when it recorded errors.
    CycleFinished(Box<RunSummary>),
}

/// Configuration for status notifications.
#[derive(Debug, Clone)]
pub struct StatusNotifierConfig {
    /// Telegram bot token for status notifications
    pub bot_token: String,
    /// Telegram chat ID to send notifications to
    pub chat_id: String,
    /// Whether to send notifications on start and stop
    pub notify_on_lifecycle: bool,
    /// Bot API base URL
    pub api_base: String,
}

impl StatusNotifierConfig {
    /// Uses the status bot token and chat id, if both are set.
    pub fn from_settings(settings: &TelegramSettings) -> Option<Self> {
        let bot_token = settings.status_bot_token.clone()?;
        let chat_id = settings.status_chat_id.clone()?;

        if bot_token.is_empty() || chat_id.is_empty() {
            return None;
        }

        Some(Self {
            bot_token,
            chat_id,
            notify_on_lifecycle: true,
            api_base: TELEGRAM_API.to_string(),
        })
    }
}

/// Render a cycle summary for the status chat, or None if it is clean.
pub fn format_cycle_report(summary: &RunSummary) -> Option<String> {
    if summary.is_clean() {
        return None;
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for err in &summary.errors {
        *counts.entry(err.kind.as_str()).or_default() += 1;
    }
    let breakdown = counts
        .iter()
        .map(|(kind, n)| format!("{} {}", n, kind))
        .collect::<Vec<_>>()
        .join(", ");

    let mut msg = format!(
        "⚠️ <b>Cycle finished with {} error(s)</b>{}\n\
         Wallets: {} | Alerts: {} | Duplicates: {} | Notified: {}\n\
         Errors: {}",
        summary.errors.len(),
        if summary.cancelled { " (cancelled)" } else { "" },
        summary.wallets_checked,
        summary.alerts_created,
        summary.duplicates_skipped,
        summary.notifications_sent,
        breakdown
    );

    for err in summary.errors.iter().take(MAX_LISTED_ERRORS) {
        let target = match (err.item_id, err.chain) {
            (Some(id), Some(chain)) => format!("#{} {}", id, chain),
            _ => "cycle".to_string(),
        };
        msg.push_str(&format!(
            "\n• [{}] {}: {}",
            err.kind.as_str(),
            escape_html(&target),
            escape_html(&err.message)
        ));
    }
    if summary.errors.len() > MAX_LISTED_ERRORS {
        msg.push_str(&format!(
            "\n… and {} more",
            summary.errors.len() - MAX_LISTED_ERRORS
        ));
    }

    Some(msg)
}

/// Status notifier that sends Telegram messages for monitor events.
pub struct StatusNotifier {
    config: StatusNotifierConfig,
    http_client: reqwest::Client,
    hostname: String,
}

impl StatusNotifier {
    /// Create a new status notifier.
    pub fn new(config: StatusNotifierConfig) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            config,
            http_client: reqwest::Client::new(),
            hostname,
        }
    }

    fn format_event(&self, event: &StatusEvent) -> Option<String> {
        let message = match event {
            StatusEvent::MonitorStarted if self.config.notify_on_lifecycle => {
                "🚀 Watchlist monitor started".to_string()
            }
            StatusEvent::MonitorStopping if self.config.notify_on_lifecycle => {
                "🛑 Watchlist monitor stopping".to_string()
            }
            StatusEvent::CycleFinished(summary) => format_cycle_report(summary)?,
            _ => return None,
        };

        let now = chrono::Utc::now();
        Some(format!(
            "<b>{}</b>\n{}\n\n⏰ {}",
            self.hostname,
            message,
            now.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    }

    /// Send a status notification.
    pub async fn notify(&self, event: &StatusEvent) {
        let Some(message) = self.format_event(event) else {
            return;
        };

        if let Err(e) = self.send_telegram_message(&message).await {
            error!("Failed to send status notification: {}", e);
        }
    }

    /// Send a message via Telegram Bot API.
    ///
    /// Errors are returned without the request URL, which embeds the token.
    async fn send_telegram_message(&self, message: &str) -> Result<(), reqwest::Error> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );

        let params = [
            ("chat_id", self.config.chat_id.as_str()),
            ("text", message),
            ("parse_mode", "HTML"),
            ("disable_web_page_preview", "true"),
        ];

        let response = self
            .http_client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.status().is_success() {
            warn!(
                "Telegram API returned non-success status: {}",
                response.status()
            );
        }

        Ok(())
    }
}

/// Shared status notifier handle for sending events from the monitor loop.
#[derive(Clone)]
pub struct StatusNotifierHandle {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusNotifierHandle {
    /// Send a status event.
    pub async fn send(&self, event: StatusEvent) {
        if let Err(e) = self.tx.send(event).await {
            warn!("Failed to send status event: {}", e);
        }
    }
}

/// Start the status notifier background task.
pub fn start_status_notifier(config: StatusNotifierConfig) -> StatusNotifierHandle {
    let (tx, mut rx) = mpsc::channel::<StatusEvent>(100);

    let notifier = Arc::new(StatusNotifier::new(config));

    tokio::spawn(async move {
        info!("Status notifier started");

        while let Some(event) = rx.recv().await {
            notifier.notify(&event).await;
        }

        info!("Status notifier stopped");
    });

    StatusNotifierHandle { tx }
}

/// Start a status notifier if the status chat is configured.
pub fn try_start_status_notifier(settings: &TelegramSettings) -> Option<StatusNotifierHandle> {
    match StatusNotifierConfig::from_settings(settings) {
        Some(config) => {
            info!(
                "Status notifier enabled (chat_id: {})",
                &config.chat_id[..config.chat_id.len().min(6)]
            );
            Some(start_status_notifier(config))
        }
        None => {
            info!("Status notifier disabled (TELEGRAM_STATUS_BOT_TOKEN or TELEGRAM_STATUS_CHAT_ID not set)");
            None
        }
    }
}
