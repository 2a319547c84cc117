//! Outcome → user-facing text and keyboard. Pure; no I/O.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::{
    backend::{short_url, LinkStats, LinkSummary},
    messaging::types::{InlineButton, InlineKeyboard, OutgoingMessage},
    outcome::{Failure, Outcome, ValidationError},
    router::{
        CALLBACK_CREATE_LINK, CALLBACK_CUSTOM_ALIAS, CALLBACK_DELETE_PREFIX, CALLBACK_HELP,
        CALLBACK_MY_LINKS, CALLBACK_STATS_PREFIX,
    },
    utils::truncate_chars,
};

pub const MSG_HELP: &str = "URL Shortener Bot\n\nCreate and manage short links efficiently.\nSelect an action below:";
pub const MSG_USE_SHORTEN: &str = "Send a URL to create a short link or use the buttons below:";
pub const MSG_SEND_URL: &str = "Send a URL to create a short link:";
pub const MSG_SEND_CUSTOM_ALIAS: &str = "Send your custom alias (letters, numbers, hyphens only):";
pub const MSG_INVALID_SHORTEN_FORMAT: &str =
    "Invalid format. Please send a valid URL (e.g., https://example.com)";
pub const MSG_INVALID_ALIAS: &str =
    "Invalid alias format. Use only letters, numbers, and hyphens (1-20 characters).";
pub const MSG_UNKNOWN_COMMAND: &str = "Unknown command. Use /start to see available options.";
pub const MSG_INTERNAL_ERROR: &str = "Internal error occurred. Please try again later.";
pub const MSG_MY_LINKS_HEADER: &str = "Your Links:";
pub const MSG_NO_LINKS: &str = "You have no links yet.\nCreate your first link!";

/// Titles longer than this are cut in list views.
const LIST_TITLE_MAX: usize = 50;
const LIST_TITLE_KEEP: usize = 47;

/// Renders outcomes. Holds the public base URL used for short links in lists.
#[derive(Clone, Debug)]
pub struct Formatter {
    base_url: String,
}

impl Formatter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn render(&self, outcome: &Outcome) -> OutgoingMessage {
        match outcome {
            Outcome::Welcome => OutgoingMessage::with_keyboard(MSG_HELP, main_keyboard()),
            Outcome::ShortenHint => OutgoingMessage::with_keyboard(MSG_USE_SHORTEN, main_keyboard()),
            Outcome::CreateLinkPrompt => {
                OutgoingMessage::with_keyboard(MSG_SEND_URL, create_link_keyboard())
            }
            Outcome::CustomAliasPrompt => OutgoingMessage::text(MSG_SEND_CUSTOM_ALIAS),
            Outcome::UrlForAliasPrompt { alias } => OutgoingMessage::text(format!(
                "Now send the URL you want to shorten with alias '{alias}':"
            )),
            Outcome::UnknownCommand => OutgoingMessage::text(MSG_UNKNOWN_COMMAND),
            Outcome::Created(link) => OutgoingMessage::with_keyboard(
                format!("Link created successfully.\n\nShort URL: {}", link.short_url),
                link_actions_keyboard(&link.alias),
            ),
            Outcome::Stats { alias, stats } => {
                OutgoingMessage::with_keyboard(format_stats(alias, stats), stats_keyboard(alias))
            }
            Outcome::Deleted { alias } => OutgoingMessage::with_keyboard(
                format!("Link '{alias}' has been deleted successfully."),
                deleted_keyboard(),
            ),
            Outcome::LinkList(links) if links.is_empty() => {
                OutgoingMessage::with_keyboard(MSG_NO_LINKS, main_keyboard())
            }
            Outcome::LinkList(links) => self.render_list(links),
            Outcome::Failure(f) => OutgoingMessage::text(failure_text(f)),
        }
    }

    fn render_list(&self, links: &[LinkSummary]) -> OutgoingMessage {
        let mut text = String::from(MSG_MY_LINKS_HEADER);
        let mut keyboard = InlineKeyboard::default();

        for (i, link) in links.iter().enumerate() {
            let label = match link.title.as_deref() {
                Some(t) if !t.is_empty() => t,
                _ => link.original_url.as_str(),
            };
            let label = truncate_chars(label, LIST_TITLE_MAX, LIST_TITLE_KEEP);
            let _ = write!(
                text,
                "\n\n{}. {}\n   {}",
                i + 1,
                label,
                short_url(&self.base_url, &link.alias)
            );

            keyboard = keyboard.row(vec![
                InlineButton::new("Stats", format!("{CALLBACK_STATS_PREFIX}{}", link.alias)),
                InlineButton::new("Delete", format!("{CALLBACK_DELETE_PREFIX}{}", link.alias)),
            ]);
        }

        let keyboard = keyboard
            .row(vec![InlineButton::new("Create Link", CALLBACK_CREATE_LINK)])
            .row(vec![InlineButton::new("Main Menu", CALLBACK_HELP)]);

        OutgoingMessage::with_keyboard(text, keyboard)
    }
}

fn failure_text(f: &Failure) -> String {
    match f {
        Failure::Validation(ValidationError::InvalidUrl) => MSG_INVALID_SHORTEN_FORMAT.to_string(),
        Failure::Validation(ValidationError::InvalidAlias) => MSG_INVALID_ALIAS.to_string(),
        Failure::Validation(ValidationError::MissingAlias { command }) => {
            format!("Invalid command format. Use: /{command} <alias>")
        }
        Failure::AliasConflict { alias } => {
            format!("Alias '{alias}' is already taken. Please choose another one.")
        }
        Failure::NotFound { alias } => format!("Link with alias '{alias}' not found."),
        Failure::Unavailable | Failure::Internal => MSG_INTERNAL_ERROR.to_string(),
    }
}

fn format_stats(alias: &str, stats: &LinkStats) -> String {
    let title = match stats.title.as_deref() {
        Some(t) if !t.is_empty() => format!("\nTitle: {t}"),
        _ => String::new(),
    };

    let mut breakdown = String::new();
    if !stats.clicks_by_category.is_empty() {
        breakdown.push_str("\n\nBy Device:");
        for (category, count) in &stats.clicks_by_category {
            let _ = write!(breakdown, "\n- {category}: {count}");
        }
    }

    format!(
        "Link Statistics: {alias}{title}\n\nOriginal URL: {}\nTotal Clicks: {}\nExpires: {}{breakdown}",
        stats.original_url,
        stats.click_count,
        format_expiry(stats.expires_at),
    )
}

fn format_expiry(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(t) => t.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => "Never".to_string(),
    }
}

pub fn main_keyboard() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![InlineButton::new("Create Link", CALLBACK_CREATE_LINK)])
        .row(vec![InlineButton::new("My Links", CALLBACK_MY_LINKS)])
        .row(vec![InlineButton::new("Help", CALLBACK_HELP)])
}

fn link_actions_keyboard(alias: &str) -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![
            InlineButton::new("Statistics", format!("{CALLBACK_STATS_PREFIX}{alias}")),
            InlineButton::new("Delete", format!("{CALLBACK_DELETE_PREFIX}{alias}")),
        ])
        .row(vec![
            InlineButton::new("My Links", CALLBACK_MY_LINKS),
            InlineButton::new("Create Another", CALLBACK_CREATE_LINK),
        ])
}

fn create_link_keyboard() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![InlineButton::new("Use Custom Alias", CALLBACK_CUSTOM_ALIAS)])
        .row(vec![InlineButton::new("Back to Menu", CALLBACK_HELP)])
}

fn stats_keyboard(alias: &str) -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![InlineButton::new(
            "Delete",
            format!("{CALLBACK_DELETE_PREFIX}{alias}"),
        )])
        .row(vec![
            InlineButton::new("My Links", CALLBACK_MY_LINKS),
            InlineButton::new("Menu", CALLBACK_HELP),
        ])
}

fn deleted_keyboard() -> InlineKeyboard {
    InlineKeyboard::default()
        .row(vec![InlineButton::new("Create Link", CALLBACK_CREATE_LINK)])
        .row(vec![
            InlineButton::new("My Links", CALLBACK_MY_LINKS),
            InlineButton::new("Menu", CALLBACK_HELP),
        ])
}
