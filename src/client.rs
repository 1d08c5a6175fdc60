use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::error::ChatError;
use crate::models::{ChatOutcome, ChatReply, ChatRequest, ChatResponseBody, HistoryResponseBody, HistoryTurn};
use crate::session::SessionId;
use crate::settings::WidgetSettings;

/// The backend endpoints the widget talks to.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, req: &ChatRequest) -> ChatOutcome;

    /// Prior turns for a session, newest first as the backend returns them.
    async fn fetch_history(&self, session_id: &SessionId, limit: u32) -> Result<Vec<HistoryTurn>, ChatError>;

    /// Succeeds when the image behind `url` can be fetched and decoded.
    async fn check_image(&self, url: &str) -> Result<(), ChatError>;
}

#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpChatApi {
    pub fn new(settings: &WidgetSettings) -> Result<Self, ChatError> {
        let mut base = settings.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let client = reqwest::Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self { client, base_url: Url::parse(&base)? })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChatError> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_message(&self, req: &ChatRequest) -> ChatOutcome {
        let url = self.endpoint("api/chat")?;
        tracing::debug!(%url, session_id = ?req.session_id, "posting chat message");
        let resp = self.client.post(url).json(req).send().await?;
        if !resp.status().is_success() {
            return Err(ChatError::Status(resp.status()));
        }
        let bytes = resp.bytes().await?;
        let body: ChatResponseBody = serde_json::from_slice(&bytes)?;
        ChatReply::try_from(body)
    }

    async fn fetch_history(&self, session_id: &SessionId, limit: u32) -> Result<Vec<HistoryTurn>, ChatError> {
        let mut url = self.endpoint("api/chat/history")?;
        url.query_pairs_mut()
            .append_pair("session_id", session_id.as_str())
            .append_pair("limit", &limit.to_string());
        tracing::debug!(%url, "fetching chat history");
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ChatError::Status(resp.status()));
        }
        let bytes = resp.bytes().await?;
        let body: HistoryResponseBody = serde_json::from_slice(&bytes)?;
        body.into_turns()
    }

    async fn check_image(&self, url: &str) -> Result<(), ChatError> {
        let url = self.base_url.join(url)?;
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ChatError::Status(resp.status()));
        }
        let is_image = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(true);
        if !is_image {
            return Err(ChatError::Status(reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE));
        }
        let bytes = resp.bytes().await?;
        image::load_from_memory(&bytes)?;
        Ok(())
    }
}
