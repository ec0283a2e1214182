//! Telegram Bot API messenger.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{DEFAULT_REQUEST_TIMEOUT, HttpRequest, HttpTransport};

use super::{Messenger, NotifyError};

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Posts messages to one chat, optionally inside a forum thread.
#[derive(Clone)]
pub struct TelegramMessenger {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
    chat_id: String,
    thread_id: Option<i64>,
}

impl TelegramMessenger {
    pub fn new(
        token: impl Into<String>,
        chat_id: impl Into<String>,
        thread_id: Option<i64>,
    ) -> Result<Self, NotifyError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self::with_transport(
            Arc::new(transport),
            token,
            chat_id,
            thread_id,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
        thread_id: Option<i64>,
    ) -> Self {
        Self {
            transport,
            base_url: TELEGRAM_API_URL.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            thread_id,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token)
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
            message_thread_id: self.thread_id,
        };
        let request = HttpRequest::post_json(self.send_url(), &payload)
            .map_err(|e| NotifyError::Encode(e.to_string()))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let parsed: Option<ApiResponse> = serde_json::from_slice(&response.body).ok();
        match parsed {
            Some(ApiResponse { ok: true, .. }) if response.is_success() => Ok(()),
            Some(ApiResponse { description, .. }) => Err(NotifyError::Rejected {
                status: response.status,
                description: description.unwrap_or_else(|| "no description".to_string()),
            }),
            None => Err(NotifyError::Rejected {
                status: response.status,
                description: String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(200)
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpResponse, MockTransport};

    fn messenger(transport: &MockTransport, thread_id: Option<i64>) -> TelegramMessenger {
        TelegramMessenger::with_transport(
            Arc::new(transport.clone()),
            "123:abc",
            "@flipper_news",
            thread_id,
        )
    }

    const URL: &str = "https://api.telegram.org/bot123:abc/sendMessage";

    #[tokio::test]
    async fn posts_html_message_to_thread() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            URL,
            serde_json::json!({"ok": true, "result": {"message_id": 1}}),
            &[],
        );
        messenger(&transport, Some(40))
            .send("<b>hi</b>")
            .await
            .unwrap();

        let requests = transport.requests();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["chat_id"], "@flipper_news");
        assert_eq!(body["text"], "<b>hi</b>");
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(body["message_thread_id"], 40);
    }

    #[tokio::test]
    async fn omits_thread_when_unset() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Post, URL, serde_json::json!({"ok": true}), &[]);
        messenger(&transport, None).send("x").await.unwrap();
        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).unwrap();
        assert!(body.get("message_thread_id").is_none());
    }

    #[tokio::test]
    async fn api_error_is_rejected() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Post,
            URL,
            HttpResponse {
                status: 400,
                headers: Vec::new(),
                body: br#"{"ok": false, "error_code": 400, "description": "Bad Request: can't parse entities"}"#.to_vec(),
            },
        );
        let err = messenger(&transport, None).send("<b").await.unwrap_err();
        match err {
            NotifyError::Rejected {
                status,
                description,
            } => {
                assert_eq!(status, 400);
                assert!(description.contains("can't parse entities"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_error_is_reported() {
        let transport = MockTransport::new();
        let err = messenger(&transport, None).send("x").await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }
}
