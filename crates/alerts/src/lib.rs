//! Alert storage and delivery for the watchlist monitor.
//!
//! This crate provides:
//! - SQLite-backed storage for users, watchlist items and transaction alerts
//! - The `AlertStore` seam used by the monitoring engine
//! - Telegram delivery and bot commands

pub mod db;
pub mod notifier;
pub mod store;
pub mod telegram;

pub use db::{Database, DbError};
pub use notifier::{escape_html, format_alert_message, NotificationSink, NotifyError, RecordingSink};
pub use store::{AlertStore, LoadedItems, ReapOutcome, RejectedItem};
pub use telegram::TelegramBot;
