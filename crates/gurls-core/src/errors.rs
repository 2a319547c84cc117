/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the dispatch
/// loop can log and answer failures consistently. Backend call outcomes do
/// not travel through here; see [`crate::backend::BackendError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
