//! Study block lifecycle (validation, invariants) and the notification
//! dispatcher (due scan, send, sent marking).

pub mod blocks;
pub mod dispatch;

pub use blocks::{BlockService, CreateBlock};
pub use dispatch::{BlockOutcome, DispatchSummary, NotificationDispatcher, OutcomeStatus, run_loop};
