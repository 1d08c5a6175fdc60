use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::client::ChatApi;
use crate::error::ChatError;
use crate::models::{ChatOutcome, ChatRequest};
use crate::session::SessionId;
use crate::settings::WidgetSettings;
use crate::transcript::{EntryId, EntryKind, ImageState, PhoneCard, Sender, Transcript};

/// Everything the chat window remembers for the lifetime of the page.
#[derive(Debug, Clone, Default)]
pub struct WidgetState {
    pub visible: bool,
    pub session_id: Option<SessionId>,
    pub input: String,
}

/// A chat request that has been shown in the transcript but not yet answered.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub typing: EntryId,
    pub request: ChatRequest,
}

pub struct ChatWidget {
    api: Arc<dyn ChatApi>,
    settings: WidgetSettings,
    state: WidgetState,
    transcript: Transcript,
}

impl ChatWidget {
    pub fn new(api: Arc<dyn ChatApi>, settings: WidgetSettings) -> Self {
        Self { api, settings, state: WidgetState::default(), transcript: Transcript::new() }
    }

    /// Continues a session minted elsewhere, e.g. by an earlier page load.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.state.session_id = Some(session_id);
        self
    }

    /// Shows the widget. The session id is minted on the first open only.
    pub fn open(&mut self) -> &SessionId {
        self.state.visible = true;
        self.state.session_id.get_or_insert_with(|| {
            let id = SessionId::mint();
            tracing::info!(session_id = %id, "chat session started");
            id
        })
    }

    pub fn close(&mut self) {
        self.state.visible = false;
    }

    pub fn toggle(&mut self) {
        if self.state.visible {
            self.close();
        } else {
            self.open();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.state.session_id.as_ref()
    }

    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    pub fn api(&self) -> Arc<dyn ChatApi> {
        Arc::clone(&self.api)
    }

    pub fn input(&self) -> &str {
        &self.state.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.input = text.into();
    }

    /// Synchronous half of a send: echo the user text, clear the input and
    /// show the typing placeholder. Returns `None` for blank text, in which
    /// case nothing changes.
    pub fn begin_send(&mut self, text: &str) -> Option<PendingSend> {
        let message = text.trim();
        if message.is_empty() {
            return None;
        }
        self.transcript.push_message(Sender::User, message);
        self.state.input.clear();
        let typing = self.transcript.push(EntryKind::Typing);
        metrics::counter!("chat_requests_total").increment(1);
        tracing::debug!(session_id = ?self.state.session_id, len = message.len(), "sending chat message");
        Some(PendingSend {
            typing,
            request: ChatRequest {
                message: message.to_string(),
                session_id: self.state.session_id.as_ref().map(|s| s.as_str().to_string()),
            },
        })
    }

    /// Applies the answer to one pending send. Outcomes may arrive in any order.
    pub fn apply_outcome(&mut self, pending: PendingSend, outcome: ChatOutcome) {
        self.transcript.remove(pending.typing);
        match outcome {
            Ok(reply) => {
                let shows_cards = reply.shows_phone_cards();
                self.transcript.push_message(Sender::Bot, reply.text);
                if !reply.quick_replies.is_empty() {
                    self.transcript.push(EntryKind::QuickReplies(reply.quick_replies));
                }
                if shows_cards {
                    let cards = reply.phones.into_iter().map(PhoneCard::new).collect();
                    self.transcript.push(EntryKind::PhoneCards(cards));
                }
            }
            Err(err) => {
                let kind = err.kind();
                metrics::counter!("chat_failures_total", "kind" => kind.as_str()).increment(1);
                tracing::warn!(error = %err, kind = kind.as_str(), "chat request failed");
                self.transcript.push_message(Sender::Bot, kind.apology());
            }
        }
    }

    /// Sends `text` and waits for the reply. Returns whether a request went out.
    pub async fn send(&mut self, text: &str) -> bool {
        let Some(pending) = self.begin_send(text) else {
            return false;
        };
        let outcome = self.api.send_message(&pending.request).await;
        self.apply_outcome(pending, outcome);
        true
    }

    /// Sends whatever is in the input box.
    pub async fn submit_input(&mut self) -> bool {
        let text = self.state.input.clone();
        self.send(&text).await
    }

    pub fn quick_reply(&self, entry: EntryId, index: usize) -> Option<&str> {
        match &self.transcript.get(entry)?.kind {
            EntryKind::QuickReplies(replies) => replies.get(index).map(String::as_str),
            _ => None,
        }
    }

    /// The most recent quick-reply row, if any.
    pub fn latest_quick_replies(&self) -> Option<(EntryId, &[String])> {
        self.transcript.entries().iter().rev().find_map(|e| match &e.kind {
            EntryKind::QuickReplies(replies) => Some((e.id, replies.as_slice())),
            _ => None,
        })
    }

    /// Same as typing the button's text and pressing send.
    pub async fn click_quick_reply(&mut self, entry: EntryId, index: usize) -> bool {
        let Some(text) = self.quick_reply(entry, index).map(str::to_string) else {
            return false;
        };
        self.set_input(text);
        self.submit_input().await
    }

    /// Replaces the transcript with up to `limit` stored turns, oldest first.
    /// Leaves the transcript alone when there is nothing to show or the fetch fails.
    pub async fn load_history(&mut self, limit: u32) -> Result<usize, ChatError> {
        let Some(session_id) = self.state.session_id.clone() else {
            return Ok(0);
        };
        metrics::counter!("chat_history_loads_total").increment(1);
        let turns = match self.api.fetch_history(&session_id, limit).await {
            Ok(turns) => turns,
            Err(err) => {
                tracing::warn!(error = %err, %session_id, "history load failed");
                return Err(err);
            }
        };
        let replayed: Vec<_> = turns.into_iter().take(limit as usize).collect();
        if replayed.is_empty() {
            return Ok(0);
        }
        self.transcript.clear();
        for turn in replayed.iter().rev() {
            self.transcript.push_message(Sender::User, turn.message.clone());
            self.transcript.push_message(Sender::Bot, turn.response.clone());
        }
        tracing::debug!(%session_id, turns = replayed.len(), "history replayed");
        Ok(replayed.len())
    }

    /// Checks every pending card image at once and swaps each one in as soon
    /// as it is known to load. Returns how many images were swapped in.
    pub async fn load_images(&mut self) -> usize {
        let mut checks = JoinSet::new();
        for entry in self.transcript.entries() {
            let EntryKind::PhoneCards(cards) = &entry.kind else {
                continue;
            };
            for (index, card) in cards.iter().enumerate() {
                if let ImageState::Pending(url) = &card.image {
                    let api = Arc::clone(&self.api);
                    let (id, url) = (entry.id, url.clone());
                    checks.spawn(async move {
                        let result = api.check_image(&url).await;
                        (id, index, url, result)
                    });
                }
            }
        }

        let mut loaded = 0;
        while let Some(joined) = checks.join_next().await {
            let (id, index, url, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    tracing::warn!(error = %err, "image check task failed");
                    continue;
                }
            };
            let Some(entry) = self.transcript.get_mut(id) else {
                continue;
            };
            let EntryKind::PhoneCards(cards) = &mut entry.kind else {
                continue;
            };
            let Some(card) = cards.get_mut(index) else {
                continue;
            };
            if card.image != ImageState::Pending(url.clone()) {
                continue;
            }
            card.image = match result {
                Ok(()) => {
                    loaded += 1;
                    ImageState::Loaded(url)
                }
                Err(err) => {
                    tracing::debug!(error = %err, %url, "keeping placeholder image");
                    ImageState::Failed(url)
                }
            };
        }
        loaded
    }

    pub fn to_html(&self) -> String {
        self.transcript.to_html(&self.settings)
    }

    /// Writes the transcript as a standalone HTML page.
    pub fn export_html(&self, path: &Path) -> std::io::Result<()> {
        let title = self
            .session_id()
            .map(|s| crate::render::escape_html(s.as_str()))
            .unwrap_or_default();
        let page = format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>DialSmart chat {title}</title></head><body>{}</body></html>\n",
            self.to_html()
        );
        std::fs::write(path, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatReply, HistoryTurn, PhoneId, PhoneSummary, ResponseKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedApi {
        replies: Mutex<VecDeque<ChatOutcome>>,
        requests: Mutex<Vec<ChatRequest>>,
        history: Mutex<Option<Result<Vec<HistoryTurn>, ChatError>>>,
        broken_images: Vec<String>,
    }

    impl ScriptedApi {
        fn with_replies(replies: Vec<ChatOutcome>) -> Self {
            Self { replies: Mutex::new(replies.into()), ..Default::default() }
        }
    }

    #[async_trait]
    impl ChatApi for ScriptedApi {
        async fn send_message(&self, req: &ChatRequest) -> ChatOutcome {
            self.requests.lock().unwrap().push(req.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatReply { text: "ok".into(), ..Default::default() }))
        }

        async fn fetch_history(&self, _session_id: &SessionId, _limit: u32) -> Result<Vec<HistoryTurn>, ChatError> {
            self.history.lock().unwrap().take().unwrap_or(Ok(Vec::new()))
        }

        async fn check_image(&self, url: &str) -> Result<(), ChatError> {
            if self.broken_images.iter().any(|u| u == url) {
                Err(ChatError::Status(reqwest::StatusCode::NOT_FOUND))
            } else {
                Ok(())
            }
        }
    }

    fn widget(api: ScriptedApi) -> (ChatWidget, Arc<ScriptedApi>) {
        let api = Arc::new(api);
        (ChatWidget::new(api.clone(), WidgetSettings::default()), api)
    }

    fn texts(w: &ChatWidget) -> Vec<(Sender, String)> {
        w.transcript()
            .entries()
            .iter()
            .filter_map(|e| match &e.kind {
                EntryKind::Message { sender, text } => Some((*sender, text.clone())),
                _ => None,
            })
            .collect()
    }

    fn phone(id: i64, image: Option<&str>, score: Option<f64>) -> PhoneSummary {
        PhoneSummary {
            id: PhoneId::Num(id),
            name: format!("Phone {id}"),
            brand: Some("Acme".into()),
            price: 1234.0,
            image: image.map(Into::into),
            match_score: score,
        }
    }

    #[test]
    fn open_mints_once_and_toggle_keeps_session() {
        let (mut w, _) = widget(ScriptedApi::default());
        assert!(w.session_id().is_none());
        let first = w.open().clone();
        let again = w.open().clone();
        assert_eq!(first, again);
        w.toggle();
        assert!(!w.is_visible());
        w.toggle();
        assert!(w.is_visible());
        assert_eq!(w.session_id(), Some(&first));
        w.close();
        assert_eq!(w.session_id(), Some(&first));
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let (mut w, api) = widget(ScriptedApi::default());
        w.open();
        for text in ["", "   ", "\n\t "] {
            assert!(!w.send(text).await);
        }
        assert!(w.transcript().is_empty());
        assert!(api.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn begin_send_echoes_then_shows_typing() {
        let (mut w, _) = widget(ScriptedApi::default());
        w.open();
        w.set_input("  hello  ");
        let text = w.input().to_string();
        let pending = w.begin_send(&text).unwrap();
        assert_eq!(w.input(), "");
        assert_eq!(pending.request.message, "hello");
        let entries = w.transcript().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Message { sender: Sender::User, text: "hello".into() });
        assert_eq!(entries[1].id, pending.typing);
        assert!(w.transcript().has_typing());
    }

    #[tokio::test]
    async fn session_id_is_stable_across_sends() {
        let (mut w, api) = widget(ScriptedApi::default());
        let sid = w.open().as_str().to_string();
        w.send("hello").await;
        w.send("world").await;
        let requests = api.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.session_id.as_deref() == Some(sid.as_str())));
    }

    #[tokio::test]
    async fn reply_renders_text_quick_replies_and_cards() {
        let reply = ChatReply {
            text: "Top picks".into(),
            kind: ResponseKind::Recommendation,
            quick_replies: vec!["Cheaper".into()],
            phones: vec![phone(1, None, Some(90.0)), phone(2, None, None)],
        };
        let (mut w, _) = widget(ScriptedApi::with_replies(vec![Ok(reply)]));
        w.open();
        w.send("recommend").await;
        assert!(!w.transcript().has_typing());
        let kinds: Vec<&EntryKind> = w.transcript().entries().iter().map(|e| &e.kind).collect();
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[1], EntryKind::Message { sender: Sender::Bot, text } if text == "Top picks"));
        assert!(matches!(kinds[2], EntryKind::QuickReplies(r) if r.len() == 1));
        assert!(matches!(kinds[3], EntryKind::PhoneCards(c) if c.len() == 2));
        assert_eq!(w.transcript().scroll_anchor(), w.transcript().entries().last().map(|e| e.id));
    }

    #[tokio::test]
    async fn failures_become_one_apology() {
        let (mut w, _) = widget(ScriptedApi::with_replies(vec![
            Err(ChatError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
            Err(ChatError::Application(None)),
        ]));
        w.open();
        w.send("one").await;
        w.send("two").await;
        assert!(!w.transcript().has_typing());
        assert_eq!(
            texts(&w),
            vec![
                (Sender::User, "one".into()),
                (Sender::Bot, "Sorry, I could not process your request. Please try again later.".into()),
                (Sender::User, "two".into()),
                (Sender::Bot, "Sorry, I encountered an error. Please try again.".into()),
            ]
        );
        // still usable afterwards
        assert!(w.send("three").await);
    }

    #[test]
    fn interleaved_outcomes_apply_in_arrival_order() {
        let (mut w, _) = widget(ScriptedApi::default());
        w.open();
        let first = w.begin_send("first").unwrap();
        let second = w.begin_send("second").unwrap();
        w.apply_outcome(second, Ok(ChatReply { text: "to second".into(), ..Default::default() }));
        assert!(w.transcript().has_typing());
        w.apply_outcome(first, Ok(ChatReply { text: "to first".into(), ..Default::default() }));
        assert!(!w.transcript().has_typing());
        let bot: Vec<String> = texts(&w).into_iter().filter(|(s, _)| *s == Sender::Bot).map(|(_, t)| t).collect();
        assert_eq!(bot, vec!["to second", "to first"]);
    }

    #[tokio::test]
    async fn quick_reply_click_sends_its_text() {
        let reply = ChatReply { text: "Pick one".into(), quick_replies: vec!["Budget".into(), "Camera".into()], ..Default::default() };
        let (mut w, api) = widget(ScriptedApi::with_replies(vec![Ok(reply)]));
        w.open();
        w.send("hi").await;
        let (row, replies) = w.latest_quick_replies().unwrap();
        assert_eq!(replies.len(), 2);
        assert!(w.click_quick_reply(row, 1).await);
        assert!(!w.click_quick_reply(row, 5).await);
        assert_eq!(api.requests.lock().unwrap().last().unwrap().message, "Camera");
    }

    #[tokio::test]
    async fn history_replays_oldest_first() {
        let api = ScriptedApi::default();
        *api.history.lock().unwrap() = Some(Ok(vec![
            HistoryTurn { message: "b2".into(), response: "r2".into() },
            HistoryTurn { message: "b1".into(), response: "r1".into() },
        ]));
        let (mut w, _) = widget(api);
        w.open();
        w.send("stale").await;
        assert_eq!(w.load_history(2).await.unwrap(), 2);
        let order: Vec<String> = texts(&w).into_iter().map(|(_, t)| t).collect();
        assert_eq!(order, vec!["b1", "r1", "b2", "r2"]);
    }

    #[tokio::test]
    async fn failed_or_empty_history_keeps_transcript() {
        let api = ScriptedApi::default();
        *api.history.lock().unwrap() = Some(Err(ChatError::Application(None)));
        let (mut w, _) = widget(api);
        w.open();
        w.send("keep me").await;
        assert!(w.load_history(20).await.is_err());
        assert_eq!(w.load_history(20).await.unwrap(), 0);
        assert_eq!(texts(&w)[0].1, "keep me");
    }

    #[tokio::test]
    async fn zero_limit_keeps_transcript() {
        let api = ScriptedApi::default();
        *api.history.lock().unwrap() = Some(Ok(vec![HistoryTurn { message: "b1".into(), response: "r1".into() }]));
        let (mut w, _) = widget(api);
        w.open();
        w.send("keep me").await;
        assert_eq!(w.transcript().len(), 2);
        assert_eq!(w.load_history(0).await.unwrap(), 0);
        assert_eq!(w.transcript().len(), 2);
        assert_eq!(texts(&w)[0].1, "keep me");
    }

    #[tokio::test]
    async fn images_swap_in_only_when_they_load() {
        let reply = ChatReply {
            text: "cards".into(),
            kind: ResponseKind::PhoneDetails,
            phones: vec![phone(1, Some("https://img.test/ok.png"), None), phone(2, Some("https://img.test/bad.png"), None), phone(3, None, None)],
            ..Default::default()
        };
        let api = ScriptedApi { broken_images: vec!["https://img.test/bad.png".into()], ..ScriptedApi::with_replies(vec![Ok(reply)]) };
        let (mut w, _) = widget(api);
        w.open();
        w.send("details").await;
        assert_eq!(w.load_images().await, 1);
        let EntryKind::PhoneCards(cards) = &w.transcript().entries().last().unwrap().kind else {
            panic!("expected phone cards");
        };
        assert_eq!(cards[0].image, ImageState::Loaded("https://img.test/ok.png".into()));
        assert_eq!(cards[1].image, ImageState::Failed("https://img.test/bad.png".into()));
        assert_eq!(cards[2].image, ImageState::Absent);
        assert_eq!(w.load_images().await, 0);
    }
}
