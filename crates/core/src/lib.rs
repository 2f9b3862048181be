//! Core data types for the watchlist monitor.

pub mod alert;
pub mod chain;
pub mod summary;
pub mod transaction;
pub mod watchlist;

pub use alert::*;
pub use chain::*;
pub use summary::*;
pub use transaction::*;
pub use watchlist::*;
