//! REST client for the board persistence service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use board_common::{Board, BoardPatch, Column, Task, TaskPatch};
use serde_json::json;
use tracing::debug;

use super::BoardPersistence;

/// Whole-request deadline when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpPersistence {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpPersistence {
    /// Every request, body included, must finish within `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("Failed to build persistence HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/boards{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "Persistence request");
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("User-Agent", "boardsync");
        match &self.auth_token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?
            .error_for_status()
            .with_context(|| format!("Persistence {} returned error status", what))
    }
}

#[async_trait]
impl BoardPersistence for HttpPersistence {
    async fn fetch_boards(&self) -> Result<Vec<Board>> {
        self.send(self.request(reqwest::Method::GET, ""), "fetch boards")
            .await?
            .json::<Vec<Board>>()
            .await
            .context("Failed to parse board list")
    }

    async fn create_board(&self, board: &Board) -> Result<()> {
        self.send(self.request(reqwest::Method::POST, "").json(board), "create board")
            .await?;
        Ok(())
    }

    async fn update_board(&self, board_id: &str, patch: &BoardPatch) -> Result<()> {
        let path = format!("/{}", board_id);
        self.send(self.request(reqwest::Method::PUT, &path).json(patch), "update board")
            .await?;
        Ok(())
    }

    async fn delete_board(&self, board_id: &str) -> Result<()> {
        let path = format!("/{}", board_id);
        self.send(self.request(reqwest::Method::DELETE, &path), "delete board")
            .await?;
        Ok(())
    }

    async fn create_column(&self, board_id: &str, column: &Column) -> Result<()> {
        let path = format!("/{}/columns", board_id);
        self.send(self.request(reqwest::Method::POST, &path).json(column), "create column")
            .await?;
        Ok(())
    }

    async fn rename_column(&self, board_id: &str, column_id: &str, title: &str) -> Result<()> {
        let path = format!("/{}/columns/{}", board_id, column_id);
        let body = json!({ "title": title });
        self.send(self.request(reqwest::Method::PUT, &path).json(&body), "rename column")
            .await?;
        Ok(())
    }

    async fn delete_column(&self, board_id: &str, column_id: &str) -> Result<()> {
        let path = format!("/{}/columns/{}", board_id, column_id);
        self.send(self.request(reqwest::Method::DELETE, &path), "delete column")
            .await?;
        Ok(())
    }

    async fn create_task(&self, board_id: &str, column_id: &str, task: &Task) -> Result<()> {
        let path = format!("/{}/tasks", board_id);
        let body = json!({ "columnId": column_id, "task": task });
        self.send(self.request(reqwest::Method::POST, &path).json(&body), "create task")
            .await?;
        Ok(())
    }

    async fn update_task(&self, board_id: &str, task_id: &str, patch: &TaskPatch) -> Result<()> {
        let path = format!("/{}/tasks/{}", board_id, task_id);
        self.send(self.request(reqwest::Method::PUT, &path).json(patch), "update task")
            .await?;
        Ok(())
    }

    async fn move_task(&self, board_id: &str, task_id: &str, to_column_id: &str, index: usize) -> Result<()> {
        let path = format!("/{}/tasks/{}/move", board_id, task_id);
        let body = json!({ "toColumnId": to_column_id, "index": index });
        self.send(self.request(reqwest::Method::PUT, &path).json(&body), "move task")
            .await?;
        Ok(())
    }

    async fn delete_task(&self, board_id: &str, task_id: &str) -> Result<()> {
        let path = format!("/{}/tasks/{}", board_id, task_id);
        self.send(self.request(reqwest::Method::DELETE, &path), "delete task")
            .await?;
        Ok(())
    }
}
