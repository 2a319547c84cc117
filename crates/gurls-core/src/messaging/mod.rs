//! Cross-messenger abstractions (Telegram is the only transport today).

pub mod port;
pub mod types;
