use std::fmt;

use crate::models::PhoneSummary;
use crate::render;
use crate::settings::WidgetSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

/// Card images show the placeholder until the real one is known to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    Absent,
    Pending(String),
    Loaded(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhoneCard {
    pub phone: PhoneSummary,
    pub image: ImageState,
}

impl PhoneCard {
    pub fn new(phone: PhoneSummary) -> Self {
        let image = match phone.image.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => ImageState::Pending(url.to_string()),
            _ => ImageState::Absent,
        };
        Self { phone, image }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Message { sender: Sender, text: String },
    Typing,
    QuickReplies(Vec<String>),
    PhoneCards(Vec<PhoneCard>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub kind: EntryKind,
}

/// Ordered, append-only list of what the chat window shows.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    next_id: u64,
    scroll_anchor: Option<EntryId>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: EntryKind) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, kind });
        self.scroll_to_newest();
        id
    }

    pub fn push_message(&mut self, sender: Sender, text: impl Into<String>) -> EntryId {
        self.push(EntryKind::Message { sender, text: text.into() })
    }

    /// Removes one entry, keeping the order of the rest.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        self.entries.remove(pos);
        self.scroll_to_newest();
        true
    }

    /// Ids keep counting across clears so stale handles never hit new entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.scroll_anchor = None;
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_typing(&self) -> bool {
        self.entries.iter().any(|e| e.kind == EntryKind::Typing)
    }

    /// Entry the view is scrolled to; always the newest one.
    pub fn scroll_anchor(&self) -> Option<EntryId> {
        self.scroll_anchor
    }

    fn scroll_to_newest(&mut self) {
        self.scroll_anchor = self.entries.last().map(|e| e.id);
    }

    pub fn to_html(&self, settings: &WidgetSettings) -> String {
        let body: String = self
            .entries
            .iter()
            .map(|e| render::render_entry(e, settings))
            .collect();
        format!(r#"<div id="chat-messages">{body}</div>"#)
    }

    /// Terminal-friendly rendering of a single entry.
    pub fn entry_text(entry: &Entry, settings: &WidgetSettings) -> String {
        match &entry.kind {
            EntryKind::Message { sender: Sender::User, text } => format!("you> {text}"),
            EntryKind::Message { sender: Sender::Bot, .. } => {
                format!("bot> {}", render::html_to_text(&render::render_entry(entry, settings)))
            }
            EntryKind::Typing => "bot> ...".to_string(),
            EntryKind::QuickReplies(replies) => replies
                .iter()
                .enumerate()
                .map(|(i, r)| format!("[/{}] {r}", i + 1))
                .collect::<Vec<_>>()
                .join("  "),
            EntryKind::PhoneCards(cards) => cards
                .iter()
                .map(|c| {
                    let score = c
                        .phone
                        .match_score
                        .map(|s| format!(" ({s}% Match)"))
                        .unwrap_or_default();
                    format!(
                        "  * {} - {}{score} -> /phone/{}",
                        c.phone.display_name(),
                        render::format_price(c.phone.price, &settings.currency),
                        c.phone.id
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_and_removal() {
        let mut t = Transcript::new();
        let a = t.push_message(Sender::User, "a");
        let typing = t.push(EntryKind::Typing);
        let b = t.push_message(Sender::Bot, "b");
        assert_eq!(t.scroll_anchor(), Some(b));
        assert!(t.has_typing());

        assert!(t.remove(typing));
        assert!(!t.remove(typing));
        assert!(!t.has_typing());
        let ids: Vec<EntryId> = t.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn ids_not_reused_after_clear() {
        let mut t = Transcript::new();
        let a = t.push_message(Sender::User, "a");
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.scroll_anchor(), None);
        let b = t.push_message(Sender::User, "b");
        assert_ne!(a, b);
        assert!(t.get(a).is_none());
    }

    #[test]
    fn image_state_from_summary() {
        let mut phone = PhoneSummary {
            id: crate::models::PhoneId::Num(1),
            name: "A".into(),
            brand: None,
            price: 1.0,
            image: Some("  ".into()),
            match_score: None,
        };
        assert_eq!(PhoneCard::new(phone.clone()).image, ImageState::Absent);
        phone.image = Some("https://img.test/a.png".into());
        assert_eq!(
            PhoneCard::new(phone).image,
            ImageState::Pending("https://img.test/a.png".into())
        );
    }

    #[test]
    fn text_view_of_entries() {
        let settings = WidgetSettings::default();
        let mut t = Transcript::new();
        t.push_message(Sender::Bot, "**Hi**\nthere");
        t.push(EntryKind::QuickReplies(vec!["Budget".into(), "Camera".into()]));
        let lines: Vec<String> = t
            .entries()
            .iter()
            .map(|e| Transcript::entry_text(e, &settings))
            .collect();
        assert_eq!(lines[0], "bot> Hi\nthere");
        assert_eq!(lines[1], "[/1] Budget  [/2] Camera");
    }
}
