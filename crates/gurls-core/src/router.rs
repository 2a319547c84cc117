//! Intent routing: (conversation state, inbound event) → intent + next state.
//!
//! Pure and synchronous. The dispatch loop owns the state store and the
//! backend; this module only decides what should happen.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::{
    backend::LinkRequest,
    conversation::ConversationState,
    domain::UserId,
    messaging::types::InboundEvent,
    outcome::ValidationError,
    utils::parse_duration,
};

// Button tokens.
pub const CALLBACK_CREATE_LINK: &str = "create_link";
pub const CALLBACK_MY_LINKS: &str = "my_links";
pub const CALLBACK_HELP: &str = "help";
pub const CALLBACK_CUSTOM_ALIAS: &str = "custom_alias";
pub const CALLBACK_STATS_PREFIX: &str = "stats_";
pub const CALLBACK_DELETE_PREFIX: &str = "delete_";

/// Backend-agnostic action implied by one inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Welcome,
    CreateLinkPrompt,
    CustomAliasPrompt,
    /// Custom alias accepted; ask for the URL (no backend call).
    AliasAccepted(String),
    ShortenHint,
    UnknownCommand,
    Shorten(LinkRequest),
    Stats(String),
    Delete(String),
    MyLinks,
    Invalid(ValidationError),
    /// Unrecognised button token; nothing to say.
    Ignore,
}

impl Intent {
    /// Whether executing this intent needs a backend call.
    pub fn needs_backend(&self) -> bool {
        matches!(
            self,
            Intent::Shorten(_) | Intent::Stats(_) | Intent::Delete(_) | Intent::MyLinks
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routed {
    pub intent: Intent,
    /// Replaces the user's state wholesale.
    pub next_state: ConversationState,
}

impl Routed {
    fn keep(state: &ConversationState, intent: Intent) -> Self {
        Self {
            intent,
            next_state: state.clone(),
        }
    }

    fn to(next_state: ConversationState, intent: Intent) -> Self {
        Self { intent, next_state }
    }
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"title="([^"]+)""#).expect("valid regex"))
}

fn alias_arg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"alias=([A-Za-z0-9_\-]+)").expect("valid regex"))
}

fn expires_in_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"expires_in=([A-Za-z0-9_]+)").expect("valid regex"))
}

fn custom_alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{1,20}$").expect("valid regex"))
}

/// First `http(s)://...` substring in `text`.
pub fn extract_url(text: &str) -> Option<&str> {
    url_re().find(text).map(|m| m.as_str())
}

pub fn is_valid_alias(alias: &str) -> bool {
    custom_alias_re().is_match(alias)
}

/// Parse `/shorten` argument text: a mandatory URL plus optional, unordered
/// `title="..."`, `alias=...`, `expires_in=<duration>` modifiers.
///
/// An unparseable `expires_in` is dropped silently.
pub fn parse_shorten_args(
    args: &str,
    owner: UserId,
    now: DateTime<Utc>,
) -> Result<LinkRequest, ValidationError> {
    let url = extract_url(args).ok_or(ValidationError::InvalidUrl)?;
    let mut req = LinkRequest::new(owner, url);

    if let Some(c) = title_re().captures(args) {
        req.title = Some(c[1].to_string());
    }

    if let Some(c) = alias_arg_re().captures(args) {
        let alias = &c[1];
        if !is_valid_alias(alias) {
            return Err(ValidationError::InvalidAlias);
        }
        req.custom_alias = Some(alias.to_string());
    }

    if let Some(c) = expires_in_re().captures(args) {
        req.expires_at = parse_duration(&c[1]).and_then(|d| now.checked_add_signed(d));
    }

    Ok(req)
}

/// Classify one inbound event given the user's current state.
pub fn route(
    state: &ConversationState,
    event: &InboundEvent,
    user: UserId,
    now: DateTime<Utc>,
) -> Routed {
    match event {
        InboundEvent::Command { name, args } => {
            Routed::keep(state, route_command(name, args, user, now))
        }
        InboundEvent::Text(text) => route_text(state, text, user),
        InboundEvent::Callback { data, .. } => route_callback(state, data),
    }
}

fn route_command(name: &str, args: &str, user: UserId, now: DateTime<Utc>) -> Intent {
    match name {
        "start" => Intent::Welcome,
        "shorten" => match parse_shorten_args(args, user, now) {
            Ok(req) => Intent::Shorten(req),
            Err(e) => Intent::Invalid(e),
        },
        "stats" => alias_intent("stats", args, Intent::Stats),
        "delete" => alias_intent("delete", args, Intent::Delete),
        "my_links" => Intent::MyLinks,
        _ => Intent::UnknownCommand,
    }
}

fn alias_intent(command: &'static str, raw: &str, build: fn(String) -> Intent) -> Intent {
    let alias = raw.trim();
    if alias.is_empty() {
        return Intent::Invalid(ValidationError::MissingAlias { command });
    }
    build(alias.to_string())
}

fn route_text(state: &ConversationState, text: &str, user: UserId) -> Routed {
    match state {
        ConversationState::AwaitingCustomAlias => {
            let alias = text.trim();
            if is_valid_alias(alias) {
                Routed::to(
                    ConversationState::AwaitingUrlForAlias(alias.to_string()),
                    Intent::AliasAccepted(alias.to_string()),
                )
            } else {
                Routed::keep(state, Intent::Invalid(ValidationError::InvalidAlias))
            }
        }
        ConversationState::AwaitingUrlForAlias(alias) => match extract_url(text) {
            Some(url) => {
                let mut req = LinkRequest::new(user, url);
                req.custom_alias = Some(alias.clone());
                Routed::to(ConversationState::Idle, Intent::Shorten(req))
            }
            None => Routed::to(
                ConversationState::Idle,
                Intent::Invalid(ValidationError::InvalidUrl),
            ),
        },
        ConversationState::Idle => match extract_url(text) {
            Some(url) => Routed::keep(state, Intent::Shorten(LinkRequest::new(user, url))),
            None => Routed::keep(state, Intent::ShortenHint),
        },
    }
}

fn route_callback(state: &ConversationState, data: &str) -> Routed {
    let intent = match data {
        CALLBACK_CREATE_LINK => Intent::CreateLinkPrompt,
        CALLBACK_MY_LINKS => Intent::MyLinks,
        CALLBACK_HELP => Intent::Welcome,
        CALLBACK_CUSTOM_ALIAS => {
            return Routed::to(
                ConversationState::AwaitingCustomAlias,
                Intent::CustomAliasPrompt,
            )
        }
        _ => {
            if let Some(alias) = data.strip_prefix(CALLBACK_STATS_PREFIX) {
                alias_intent("stats", alias, Intent::Stats)
            } else if let Some(alias) = data.strip_prefix(CALLBACK_DELETE_PREFIX) {
                alias_intent("delete", alias, Intent::Delete)
            } else {
                Intent::Ignore
            }
        }
    };
    Routed::keep(state, intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    const U: UserId = UserId(42);

    fn text(s: &str) -> InboundEvent {
        InboundEvent::Text(s.to_string())
    }

    fn cmd(s: &str) -> InboundEvent {
        InboundEvent::parse_command(s)
    }

    fn button(data: &str) -> InboundEvent {
        InboundEvent::Callback {
            callback_id: "cb".to_string(),
            data: data.to_string(),
        }
    }

    fn route_now(state: &ConversationState, event: &InboundEvent) -> Routed {
        route(state, event, U, Utc::now())
    }

    #[test]
    fn awaiting_alias_accepts_valid_alias_without_backend() {
        let r = route_now(&ConversationState::AwaitingCustomAlias, &text("  my-Alias1 "));
        assert_eq!(r.intent, Intent::AliasAccepted("my-Alias1".to_string()));
        assert!(!r.intent.needs_backend());
        assert_eq!(
            r.next_state,
            ConversationState::AwaitingUrlForAlias("my-Alias1".to_string())
        );
    }

    #[test]
    fn awaiting_alias_rejects_invalid_alias_and_keeps_state() {
        for bad in ["has space", "under_score", "", "a".repeat(21).as_str(), "ünï"] {
            let r = route_now(&ConversationState::AwaitingCustomAlias, &text(bad));
            assert_eq!(
                r.intent,
                Intent::Invalid(ValidationError::InvalidAlias),
                "{bad:?}"
            );
            assert_eq!(r.next_state, ConversationState::AwaitingCustomAlias);
        }
    }

    #[test]
    fn awaiting_url_builds_request_with_carried_alias() {
        let state = ConversationState::AwaitingUrlForAlias("foo".to_string());
        let r = route_now(&state, &text("here: https://a.b/c extra"));
        let Intent::Shorten(req) = r.intent else {
            panic!("expected shorten intent, got {:?}", r.intent);
        };
        assert_eq!(req.original_url, "https://a.b/c");
        assert_eq!(req.custom_alias.as_deref(), Some("foo"));
        assert_eq!(req.owner, U);
        assert_eq!(r.next_state, ConversationState::Idle);
    }

    #[test]
    fn awaiting_url_without_url_resets_to_idle() {
        let state = ConversationState::AwaitingUrlForAlias("foo".to_string());
        let r = route_now(&state, &text("no link here"));
        assert_eq!(r.intent, Intent::Invalid(ValidationError::InvalidUrl));
        assert_eq!(r.next_state, ConversationState::Idle);
    }

    #[test]
    fn idle_text_with_url_ignores_modifiers() {
        let r = route_now(
            &ConversationState::Idle,
            &text("look https://x.com/a?b=1 alias=zz title=\"T\""),
        );
        assert_eq!(
            r.intent,
            Intent::Shorten(LinkRequest::new(U, "https://x.com/a?b=1"))
        );
        assert_eq!(r.next_state, ConversationState::Idle);
    }

    #[test]
    fn idle_text_without_url_is_a_hint() {
        let r = route_now(&ConversationState::Idle, &text("hello"));
        assert_eq!(r.intent, Intent::ShortenHint);
        assert!(!r.intent.needs_backend());
    }

    #[test]
    fn shorten_parses_all_modifiers_in_any_order() {
        let now = Utc::now();
        let r = route(
            &ConversationState::Idle,
            &cmd("/shorten https://x.com title=\"T\" expires_in=2h alias=z"),
            U,
            now,
        );
        let Intent::Shorten(req) = r.intent else {
            panic!("expected shorten intent");
        };
        assert_eq!(req.original_url, "https://x.com");
        assert_eq!(req.title.as_deref(), Some("T"));
        assert_eq!(req.custom_alias.as_deref(), Some("z"));
        let expires = req.expires_at.expect("expiry set");
        let delta = expires - now;
        assert!((delta - Duration::hours(2)).num_seconds().abs() <= 2);
    }

    #[test]
    fn shorten_drops_unparseable_expiry() {
        let r = route_now(
            &ConversationState::Idle,
            &cmd("/shorten https://x.com expires_in=notaduration"),
        );
        let Intent::Shorten(req) = r.intent else {
            panic!("expected shorten intent");
        };
        assert_eq!(req.original_url, "https://x.com");
        assert_eq!(req.expires_at, None);
    }

    #[test]
    fn shorten_title_may_contain_spaces() {
        let req = parse_shorten_args(
            "alias=docs title=\"Rust book\" https://doc.rust-lang.org/book/",
            U,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(req.original_url, "https://doc.rust-lang.org/book/");
        assert_eq!(req.title.as_deref(), Some("Rust book"));
        assert_eq!(req.custom_alias.as_deref(), Some("docs"));
    }

    #[test]
    fn shorten_requires_url() {
        let r = route_now(&ConversationState::Idle, &cmd("/shorten title=\"x\""));
        assert_eq!(r.intent, Intent::Invalid(ValidationError::InvalidUrl));
    }

    #[test]
    fn shorten_rejects_malformed_alias() {
        let r = route_now(
            &ConversationState::Idle,
            &cmd("/shorten https://x.com alias=has_underscore"),
        );
        assert_eq!(r.intent, Intent::Invalid(ValidationError::InvalidAlias));
    }

    #[test]
    fn commands_ignore_and_preserve_state() {
        let state = ConversationState::AwaitingUrlForAlias("keep".to_string());
        let r = route_now(&state, &cmd("/bogus"));
        assert_eq!(r.intent, Intent::UnknownCommand);
        assert_eq!(r.next_state, state);

        let r = route_now(&state, &cmd("/my_links"));
        assert_eq!(r.intent, Intent::MyLinks);
        assert_eq!(r.next_state, state);
    }

    #[test]
    fn stats_and_delete_need_an_alias() {
        let r = route_now(&ConversationState::Idle, &cmd("/stats   "));
        assert_eq!(
            r.intent,
            Intent::Invalid(ValidationError::MissingAlias { command: "stats" })
        );
        let r = route_now(&ConversationState::Idle, &cmd("/delete abc"));
        assert_eq!(r.intent, Intent::Delete("abc".to_string()));
        let r = route_now(&ConversationState::Idle, &cmd("/start"));
        assert_eq!(r.intent, Intent::Welcome);
    }

    #[test]
    fn buttons_route_by_token() {
        let idle = ConversationState::Idle;
        assert_eq!(
            route_now(&idle, &button("create_link")).intent,
            Intent::CreateLinkPrompt
        );
        assert_eq!(route_now(&idle, &button("help")).intent, Intent::Welcome);
        assert_eq!(route_now(&idle, &button("my_links")).intent, Intent::MyLinks);
        assert_eq!(
            route_now(&idle, &button("stats_abc")).intent,
            Intent::Stats("abc".to_string())
        );
        assert_eq!(
            route_now(&idle, &button("delete_x-1")).intent,
            Intent::Delete("x-1".to_string())
        );
        assert_eq!(route_now(&idle, &button("cancel")).intent, Intent::Ignore);

        let r = route_now(&idle, &button("custom_alias"));
        assert_eq!(r.intent, Intent::CustomAliasPrompt);
        assert_eq!(r.next_state, ConversationState::AwaitingCustomAlias);
    }

    fn arb_state() -> impl Strategy<Value = ConversationState> {
        prop_oneof![
            Just(ConversationState::Idle),
            Just(ConversationState::AwaitingCustomAlias),
            "[a-z0-9-]{1,20}".prop_map(ConversationState::AwaitingUrlForAlias),
        ]
    }

    proptest! {
        #[test]
        fn valid_aliases_are_carried_verbatim(alias in "[A-Za-z0-9-]{1,20}") {
            let r = route_now(&ConversationState::AwaitingCustomAlias, &text(&alias));
            prop_assert_eq!(r.intent, Intent::AliasAccepted(alias.clone()));
            prop_assert_eq!(r.next_state, ConversationState::AwaitingUrlForAlias(alias));
        }

        #[test]
        fn menu_buttons_never_need_backend(
            state in arb_state(),
            token in prop_oneof![
                Just("create_link".to_string()),
                Just("help".to_string()),
                Just("custom_alias".to_string()),
                "[a-z]{1,12}",
            ],
        ) {
            let r = route_now(&state, &button(&token));
            prop_assert!(!r.intent.needs_backend(), "{:?} -> {:?}", token, r.intent);
        }

        #[test]
        fn text_in_idle_never_changes_state(s in "\\PC{0,60}") {
            let r = route_now(&ConversationState::Idle, &text(&s));
            prop_assert_eq!(r.next_state, ConversationState::Idle);
        }
    }
}
