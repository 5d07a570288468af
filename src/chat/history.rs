//! Chat history over plain HTTP.
//!
//! `GET <server>/chat/history?room=<room>&limit=<n>` returns a
//! [`ChatHistory`]. Used by the `/history` session command and the
//! `mangahub history` subcommand; it never touches the WebSocket.

use anyhow::{Context, Result};
use reqwest::Url;

use super::types::ChatHistory;
use crate::constants::{HISTORY_PATH, HTTP_REQUEST_TIMEOUT};

/// Client for the chat history endpoint.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HistoryClient {
    /// Create a client for the chat server at `base_url` (http or https).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Server base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request URL for `room` and `limit`.
    pub fn history_url(&self, room: &str, limit: usize) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, HISTORY_PATH))
            .with_context(|| format!("Invalid chat server URL: {}", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("room", room)
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }

    /// Fetch up to `limit` recent messages for `room`.
    pub async fn fetch(&self, room: &str, limit: usize) -> Result<ChatHistory> {
        let url = self.history_url(room, limit)?;
        log::debug!("[History] GET {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to request chat history")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Server returned {}: {}", status, body.trim());
        }

        let history: ChatHistory = response
            .json()
            .await
            .context("Invalid chat history response")?;
        log::info!(
            "[History] {} message(s) for room {}",
            history.messages.len(),
            history.room
        );
        Ok(history)
    }
}
