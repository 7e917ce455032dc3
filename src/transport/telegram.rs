//! Telegram Bot API transport
//!
//! Sends log messages with `sendMessage` and log files with `sendDocument`.
//! Bot API errors are classified into [`SendOutcome`] variants so the retry
//! loops never have to look at HTTP details.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ChatId, ChatTransport, SendOutcome};
use crate::delivery::LOCAL_TARGET;

/// Public Bot API endpoint
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Upper bound for a server supplied flood-control wait
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Error payload returned by the Bot API
#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
    #[serde(default)]
    migrate_to_chat_id: Option<i64>,
}

/// Bot API client for the log chat
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl TelegramTransport {
    /// Create a transport against the public Bot API
    pub fn new(token: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        Self::with_api_url(token, DEFAULT_API_URL, timeout)
    }

    /// Create a transport against a custom Bot API server
    pub fn with_api_url(
        token: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn execute(&self, method: &str, request: reqwest::RequestBuilder) -> SendOutcome {
        let response = match request.send().await {
            Ok(response) => response,
            // The URL carries the bot token, keep it out of the logs
            Err(e) => return SendOutcome::Transient(e.without_url().to_string()),
        };

        let status = response.status().as_u16();
        let body = response.json::<ApiResponse>().await.ok();
        let outcome = classify(status, body);
        debug!(target: LOCAL_TARGET, method, status, ?outcome, "Bot API response");
        outcome
    }
}

/// Map an HTTP status and optional Bot API body onto a send outcome
fn classify(status: u16, body: Option<ApiResponse>) -> SendOutcome {
    let body = match body {
        Some(body) if body.ok && (200..300).contains(&status) => return SendOutcome::Delivered,
        Some(body) => body,
        None if (200..300).contains(&status) => {
            return SendOutcome::Transient(format!("unreadable response (HTTP {})", status))
        }
        None => ApiResponse::default(),
    };

    let code = body.error_code.unwrap_or(status);
    let description = body
        .description
        .unwrap_or_else(|| format!("HTTP {}", status));
    let parameters = body.parameters.unwrap_or_default();

    if let Some(new_chat_id) = parameters.migrate_to_chat_id {
        return SendOutcome::Permanent(format!(
            "log chat was migrated to supergroup {}, update the chat id",
            new_chat_id
        ));
    }

    if let Some(seconds) = parameters.retry_after {
        return SendOutcome::RetryAfter(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    match code {
        // Flood control without a hint still deserves a retry
        429 => SendOutcome::Transient(description),
        400 | 401 | 403 | 404 => SendOutcome::Permanent(description),
        _ => SendOutcome::Transient(description),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> SendOutcome {
        let request = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({ "chat_id": chat_id, "text": text }));
        self.execute("sendMessage", request).await
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        bytes: &[u8],
        filename: &str,
        caption: &str,
    ) -> SendOutcome {
        let document = Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("disable_notification", "false")
            .part("document", document);

        let request = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form);
        self.execute("sendDocument", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const TOKEN: &str = "123:test-token";

    fn transport(server: &Server) -> TelegramTransport {
        TelegramTransport::with_api_url(TOKEN, server.url(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_classify_ok() {
        let body: ApiResponse = serde_json::from_str(r#"{"ok":true,"result":{}}"#).unwrap();
        assert_eq!(classify(200, Some(body)), SendOutcome::Delivered);
    }

    #[test]
    fn test_classify_flood_control() {
        let body: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 10","parameters":{"retry_after":10}}"#,
        )
        .unwrap();
        assert_eq!(
            classify(429, Some(body)),
            SendOutcome::RetryAfter(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_classify_clamps_absurd_retry_after() {
        let body: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"parameters":{"retry_after":18446744073709551615}}"#,
        )
        .unwrap();
        assert_eq!(
            classify(429, Some(body)),
            SendOutcome::RetryAfter(MAX_RETRY_AFTER)
        );
    }

    #[test]
    fn test_classify_migrated_chat_is_permanent() {
        let body: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: group chat was upgraded to a supergroup chat","parameters":{"migrate_to_chat_id":-1001234}}"#,
        )
        .unwrap();
        match classify(400, Some(body)) {
            SendOutcome::Permanent(reason) => assert!(reason.contains("-1001234")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_classify_server_error_is_transient() {
        assert!(matches!(classify(502, None), SendOutcome::Transient(_)));
        assert!(matches!(classify(200, None), SendOutcome::Transient(_)));
    }

    #[test]
    fn test_classify_forbidden_is_permanent() {
        let body: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was kicked from the group chat"}"#,
        )
        .unwrap();
        assert_eq!(
            classify(403, Some(body)),
            SendOutcome::Permanent("Forbidden: bot was kicked from the group chat".to_string())
        );
    }

    #[tokio::test]
    async fn test_send_text_posts_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:test-token/sendMessage")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(
                json!({ "chat_id": -42, "text": "hello" }),
            ))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .create_async()
            .await;

        let outcome = transport(&server).send_text(-42, "hello").await;

        assert_eq!(outcome, SendOutcome::Delivered);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_text_flood_control() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/bot123:test-token/sendMessage")
            .with_status(429)
            .with_body(r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":7}}"#)
            .create_async()
            .await;

        let outcome = transport(&server).send_text(-42, "hello").await;

        assert_eq!(outcome, SendOutcome::RetryAfter(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_send_document_uploads_multipart() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:test-token/sendDocument")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data.*".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("error_2026-03-02_14-30-45.txt".to_string()),
                Matcher::Regex("boom".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":2}}"#)
            .create_async()
            .await;

        let outcome = transport(&server)
            .send_document(-42, b"context\nboom", "error_2026-03-02_14-30-45.txt", "❌ ERROR")
            .await;

        assert_eq!(outcome, SendOutcome::Delivered);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let transport =
            TelegramTransport::with_api_url(TOKEN, "http://127.0.0.1:1", Duration::from_secs(1))
                .unwrap();

        match transport.send_text(-42, "hello").await {
            SendOutcome::Transient(reason) => assert!(!reason.contains("test-token")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
