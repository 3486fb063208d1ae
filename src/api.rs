use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::composer::Attachment;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::model::{ApiResponse, ChatRow, MessageRow, NewMessages, SearchHit};

/// HTTP client for the relay's operator API.
///
/// Cheap to clone; clones share the connection pool and the session cookie.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(4)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL for a server-relative media path like `/static/uploads/x.jpg`.
    pub fn media_url(&self, media_path: &str) -> String {
        if media_path.starts_with("http://") || media_path.starts_with("https://") {
            media_path.to_string()
        } else if media_path.starts_with('/') {
            self.url(media_path)
        } else {
            format!("{}/{}", self.base_url, media_path)
        }
    }

    /// Log in with the relay's form login; the session cookie is kept by the client.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.url("/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let resp = resp.error_for_status()?;
        // Success redirects to the index; failure re-renders the login page.
        if is_login_page(&resp) {
            warn!(username, "login rejected");
            return Err(ApiError::Rejected("invalid username or password".to_string()));
        }
        info!(username, "logged in");
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn list_chats(&self) -> Result<Vec<ChatRow>, ApiError> {
        self.get_json("/api/chats", self.http.get(self.url("/api/chats")))
            .await
    }

    pub async fn list_messages(&self, user_id: i64) -> Result<Vec<MessageRow>, ApiError> {
        let path = format!("/api/messages/{}", user_id);
        self.get_json(&path, self.http.get(self.url(&path))).await
    }

    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>, ApiError> {
        let req = self
            .http
            .get(self.url("/api/search"))
            .query(&[("term", term)]);
        self.get_json("/api/search", req).await
    }

    pub async fn check_new(&self) -> Result<NewMessages, ApiError> {
        self.get_json("/api/new-messages", self.http.get(self.url("/api/new-messages")))
            .await
    }

    // ── Mutations ───────────────────────────────────────────────────

    pub async fn mark_read(&self, user_id: i64) -> Result<ApiResponse, ApiError> {
        let path = format!("/api/messages/{}/read", user_id);
        self.post_action(&path, self.http.post(self.url(&path)))
            .await
    }

    pub async fn send_reply(&self, user_id: i64, text: &str) -> Result<ApiResponse, ApiError> {
        let req = self
            .http
            .post(self.url("/api/reply"))
            .json(&json!({ "user_id": user_id, "reply_text": text }));
        self.post_action("/api/reply", req).await
    }

    pub async fn upload_file(
        &self,
        user_id: i64,
        file: &Attachment,
    ) -> Result<ApiResponse, ApiError> {
        let part = Part::bytes(file.data.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new()
            .part("file", part)
            .text("user_id", user_id.to_string());
        debug!(user_id, file = %file.file_name, bytes = file.size(), "uploading");
        let req = self.http.post(self.url("/api/upload-file")).multipart(form);
        self.post_action("/api/upload-file", req).await
    }

    pub async fn delete_message(&self, message_id: i64) -> Result<ApiResponse, ApiError> {
        let path = format!("/api/message/{}/delete", message_id);
        self.post_action(&path, self.http.post(self.url(&path)))
            .await
    }

    pub async fn delete_conversation(&self, user_id: i64) -> Result<ApiResponse, ApiError> {
        let path = format!("/api/conversation/{}/delete", user_id);
        self.post_action(&path, self.http.post(self.url(&path)))
            .await
    }

    /// Set (or, with an empty alias, remove) the operator's name for a user.
    pub async fn set_alias(&self, user_id: i64, alias: &str) -> Result<ApiResponse, ApiError> {
        let req = self
            .http
            .post(self.url("/api/set-alias"))
            .json(&json!({ "user_id": user_id, "alias": alias }));
        self.post_action("/api/set-alias", req).await
    }

    // ── Plumbing ────────────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        req: RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = req.send().await?;
        let body = checked_body(resp).await?;
        debug!(path, bytes = body.len(), "GET ok");
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_action(&self, path: &str, req: RequestBuilder) -> Result<ApiResponse, ApiError> {
        let resp = req.send().await?;
        let body = checked_body(resp).await?;
        let parsed: ApiResponse = serde_json::from_slice(&body)?;
        debug!(path, success = parsed.success, "POST done");
        into_result(parsed)
    }
}

/// Status check plus the redirect-to-login check flask-login does on expiry.
async fn checked_body(resp: Response) -> Result<Vec<u8>, ApiError> {
    let resp = resp.error_for_status()?;
    if is_login_page(&resp) {
        return Err(ApiError::Unauthenticated);
    }
    Ok(resp.bytes().await?.to_vec())
}

fn is_login_page(resp: &Response) -> bool {
    resp.url().path().trim_end_matches('/').ends_with("/login")
}

/// Turn `{success: false, error}` into an error.
pub fn into_result(resp: ApiResponse) -> Result<ApiResponse, ApiError> {
    if resp.success {
        Ok(resp)
    } else {
        Err(ApiError::Rejected(
            resp.error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }
}
