//! Alert delivery.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use watchlist_core::{AlertNotice, AlertType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Invalid chat id: {0}")]
    InvalidChatId(String),
    #[error("Telegram error: {0}")]
    Telegram(String),
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Delivers an alert to a user's linked messaging handle.
///
/// Delivery is best effort. A failure is reported to the caller but never
/// rolls back the stored alert.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, handle: &str, notice: &AlertNotice) -> Result<(), NotifyError>;
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn short_address(address: &str) -> String {
    if address.len() <= 14 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}…{}", &address[..8], &address[address.len() - 4..])
}

/// Format an alert as a Telegram HTML message.
pub fn format_alert_message(notice: &AlertNotice) -> String {
    let (icon, title) = match notice.alert_type {
        AlertType::Sent => ("📤", "Outgoing transaction"),
        AlertType::Received => ("📥", "Incoming transaction"),
        AlertType::Contract => ("📜", "Contract interaction"),
    };

    let mut msg = format!("{} <b>{}</b>\n\n", icon, title);

    match &notice.label {
        Some(label) if !label.is_empty() => msg.push_str(&format!(
            "<b>Wallet:</b> {} (<code>{}</code>)\n",
            escape_html(label),
            short_address(&notice.wallet_address)
        )),
        _ => msg.push_str(&format!(
            "<b>Wallet:</b> <code>{}</code>\n",
            notice.wallet_address
        )),
    }

    msg.push_str(&format!("<b>Chain:</b> {}\n", notice.chain.as_str()));
    msg.push_str(&format!("<b>Type:</b> {}\n", notice.alert_type));

    if notice.value != "0" {
        msg.push_str(&format!(
            "<b>Value:</b> {} {}\n",
            notice.value,
            notice.chain.native_symbol()
        ));
    }

    if let Some(amount) = &notice.token_amount {
        let symbol = notice.token_symbol.as_deref().unwrap_or("tokens");
        msg.push_str(&format!(
            "<b>Token:</b> {} {}\n",
            escape_html(amount),
            escape_html(symbol)
        ));
    }

    msg.push_str(&format!(
        "\n<a href=\"{}\">View transaction</a>",
        notice.chain.explorer_tx_url(&notice.transaction_hash)
    ));

    msg
}

/// Sink that records deliveries, for tests and dry runs.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(String, AlertNotice)>>,
    failing: Mutex<Option<NotifyError>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before each delivery.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every subsequent delivery with `error`.
    pub fn fail_with(&self, error: NotifyError) {
        if let Ok(mut failing) = self.failing.lock() {
            *failing = Some(error);
        }
    }

    /// Deliveries made so far, as (handle, notice).
    pub fn sent(&self) -> Vec<(String, AlertNotice)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, handle: &str, notice: &AlertNotice) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failing.lock().ok().and_then(|f| f.clone()) {
            return Err(err);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((handle.to_string(), notice.clone()));
        }
        Ok(())
    }
}
