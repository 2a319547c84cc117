//! Result of one pipeline run, before formatting.

use crate::backend::{CreatedLink, LinkStats, LinkSummary};

/// Input problems detected locally; never reach the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// No URL-shaped substring where one was required.
    InvalidUrl,
    /// Alias does not match `^[A-Za-z0-9-]{1,20}$`.
    InvalidAlias,
    /// `/stats` or `/delete` (or a button) without an alias.
    MissingAlias { command: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    Validation(ValidationError),
    AliasConflict { alias: String },
    NotFound { alias: String },
    Unavailable,
    /// Anything unclassified (panics, transport failures, protocol surprises).
    Internal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Main menu (`/start`, Help button).
    Welcome,
    CreateLinkPrompt,
    CustomAliasPrompt,
    /// Alias accepted; ask for the URL to pair with it.
    UrlForAliasPrompt { alias: String },
    ShortenHint,
    UnknownCommand,
    Created(CreatedLink),
    Stats { alias: String, stats: LinkStats },
    Deleted { alias: String },
    LinkList(Vec<LinkSummary>),
    Failure(Failure),
}

impl From<Failure> for Outcome {
    fn from(f: Failure) -> Self {
        Outcome::Failure(f)
    }
}

impl From<ValidationError> for Outcome {
    fn from(v: ValidationError) -> Self {
        Outcome::Failure(Failure::Validation(v))
    }
}
