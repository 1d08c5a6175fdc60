//! HTML rendering for transcript entries.
//!
//! Every piece of text coming from the user or the backend is escaped first.
//! Markup is only ever introduced by the fixed substitutions in
//! [`format_bot_text`] and by the entry templates below.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};
use url::Url;

use crate::settings::WidgetSettings;
use crate::transcript::{Entry, EntryKind, ImageState, PhoneCard, Sender};

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());

static BOLD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());

const SAFE_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

/// Bot text to HTML: `[label](url)` links, `**bold**` and line breaks.
///
/// Bold and line breaks are applied to text outside links and to link
/// labels, never to an href.
pub fn format_bot_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = 0;
    for caps in LINK_PATTERN.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&format_inline(&text[rest..whole.start()]));
        let label = format_inline(&caps[1]);
        let href = caps[2].trim();
        if is_safe_href(href) {
            out.push_str(&format!(
                r#"<a href="{}" class="text-primary text-decoration-underline" target="_blank" rel="noopener">{label}</a>"#,
                escape_html(href)
            ));
        } else {
            out.push_str(&label);
        }
        rest = whole.end();
    }
    out.push_str(&format_inline(&text[rest..]));
    out
}

fn format_inline(text: &str) -> String {
    let escaped = escape_html(text);
    BOLD_PATTERN
        .replace_all(&escaped, "<strong>$1</strong>")
        .replace('\n', "<br>")
}

/// Relative links and http(s)/mailto only. Tabs and newlines are dropped and
/// leading controls trimmed first, the same way browsers read a scheme.
fn is_safe_href(href: &str) -> bool {
    let cleaned: String = href.chars().filter(|c| !matches!(c, '\t' | '\n' | '\r')).collect();
    let cleaned = cleaned.trim_start_matches(|c: char| c <= ' ');
    match Url::parse(cleaned) {
        Ok(url) => SAFE_SCHEMES.contains(&url.scheme()),
        Err(url::ParseError::RelativeUrlWithoutBase) => true,
        Err(_) => false,
    }
}

pub fn format_price(price: f64, currency: &str) -> String {
    format!("{currency} {price:.2}")
}

pub fn render_entry(entry: &Entry, settings: &WidgetSettings) -> String {
    let id = entry.id;
    match &entry.kind {
        EntryKind::Message { sender, text } => {
            let (class, body) = match sender {
                Sender::User => ("user-message", escape_html(text)),
                Sender::Bot => ("bot-message", format_bot_text(text)),
            };
            format!(
                r#"<div class="chat-message {class}" data-entry="{id}"><div class="message-content">{body}</div></div>"#
            )
        }
        EntryKind::Typing => format!(
            r#"<div class="chat-message bot-message typing-indicator" data-entry="{id}"><div class="message-content"><span class="typing-dot"></span><span class="typing-dot"></span><span class="typing-dot"></span></div></div>"#
        ),
        EntryKind::QuickReplies(replies) => {
            let buttons: String = replies
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    format!(
                        r#"<button class="btn btn-sm btn-outline-primary me-1 mb-1 dynamic-quick-reply" data-index="{i}">{}</button>"#,
                        escape_html(r)
                    )
                })
                .collect();
            format!(r#"<div class="quick-replies mt-2 mb-2" data-entry="{id}">{buttons}</div>"#)
        }
        EntryKind::PhoneCards(cards) => {
            let body: String = cards.iter().map(|c| render_phone_card(c, settings)).collect();
            format!(r#"<div class="phone-recommendations mt-2" data-entry="{id}">{body}</div>"#)
        }
    }
}

fn render_phone_card(card: &PhoneCard, settings: &WidgetSettings) -> String {
    let phone = &card.phone;
    let name = escape_html(&phone.display_name());
    let (src, pending) = match &card.image {
        ImageState::Loaded(url) => (url.as_str(), None),
        ImageState::Pending(url) => (settings.placeholder_image.as_str(), Some(url.as_str())),
        ImageState::Failed(_) | ImageState::Absent => (settings.placeholder_image.as_str(), None),
    };
    let data_src = pending
        .map(|u| format!(r#" data-src="{}""#, escape_html(u)))
        .unwrap_or_default();
    let badge = phone
        .match_score
        .map(|s| format!(r#"<span class="badge bg-success ms-2">{s}% Match</span>"#))
        .unwrap_or_default();
    format!(
        concat!(
            r#"<div class="card mb-2"><div class="row g-0"><div class="col-4">"#,
            r#"<img src="{src}"{data_src} class="img-fluid rounded-start" alt="{name}" width="120" height="120">"#,
            r#"</div><div class="col-8"><div class="card-body p-2">"#,
            r#"<h6 class="card-title mb-1">{name}</h6>"#,
            r#"<p class="card-text mb-1 small"><strong class="text-primary">{price}</strong>{badge}</p>"#,
            r#"<a href="/phone/{id}" class="btn btn-sm btn-primary" target="_blank" rel="noopener">View Details</a>"#,
            r#"</div></div></div></div>"#
        ),
        src = escape_html(src),
        data_src = data_src,
        name = name,
        price = escape_html(&format_price(phone.price, &settings.currency)),
        badge = badge,
        id = escape_html(&phone.id.to_string()),
    )
}

/// Text content of an HTML fragment, with `<br>` kept as newlines.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}
