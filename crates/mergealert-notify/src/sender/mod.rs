//! Chat channel senders.
//!
//! Each sender delivers one rendered merge-request alert to one
//! destination. Senders never retry; the first error is returned to the
//! dispatcher, which records it.

pub mod custom;
pub mod dingtalk;
pub mod wecom;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use mergealert_core::error::AppError;
use mergealert_entity::destination::{Channel, Destination};

use crate::payload::MergeRequestPayload;

pub use custom::CustomSender;
pub use dingtalk::DingTalkSender;
pub use wecom::WeComSender;

/// User-Agent attached to outbound chat posts.
pub const USER_AGENT: &str = concat!("GitLab-Merge-Alert/", env!("CARGO_PKG_VERSION"));

/// Delivers alerts to destinations of one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync + std::fmt::Debug + 'static {
    /// Channel this sender serves.
    fn channel(&self) -> Channel;

    /// Deliver `payload` to `destination`.
    ///
    /// Must return [`SendError::Cancelled`] promptly once `cancel` fires.
    async fn send(
        &self,
        cancel: &CancellationToken,
        destination: &Destination,
        payload: &MergeRequestPayload,
    ) -> Result<(), SendError>;
}

/// Delivery failure for one destination.
#[derive(Debug, Error)]
pub enum SendError {
    /// Local token bucket denied the call; nothing was sent.
    #[error("{0} rate limit reached")]
    RateLimited(Channel),

    /// Monthly cap reached; nothing was sent.
    #[error("monthly quota exceeded ({current}/{quota})")]
    QuotaExceeded {
        /// Sends counted this period.
        current: i64,
        /// Configured cap.
        quota: i64,
    },

    /// The request failed or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform answered with an unexpected HTTP status.
    #[error("{channel} http status {status}")]
    Status {
        /// Channel that answered.
        channel: Channel,
        /// HTTP status code.
        status: u16,
    },

    /// The platform accepted the request but reported an error code.
    #[error("platform error {code}: {message}")]
    Platform {
        /// Platform error code.
        code: i64,
        /// Platform error message.
        message: String,
    },

    /// The destination is misconfigured (for example an unparseable URL).
    #[error("invalid destination: {0}")]
    Config(String),

    /// The caller cancelled the send.
    #[error("send cancelled")]
    Cancelled,

    /// Quota bookkeeping failed.
    #[error("quota storage: {0}")]
    Storage(#[from] AppError),
}

impl SendError {
    /// Whether the error was raised locally before any network call.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::QuotaExceeded { .. })
    }
}

impl From<SendError> for AppError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Storage(inner) => inner,
            SendError::RateLimited(_) => AppError::rate_limited(err.to_string()),
            SendError::QuotaExceeded { .. } => AppError::quota_exceeded(err.to_string()),
            SendError::Config(_) => AppError::configuration(err.to_string()),
            SendError::Cancelled => AppError::service_unavailable(err.to_string()),
            SendError::Transport(_) | SendError::Status { .. } | SendError::Platform { .. } => {
                AppError::external(err.to_string())
            }
        }
    }
}

/// Build the shared HTTP client for a sender.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// POST `body` as JSON with the destination's custom headers, racing the
/// request against `cancel`.
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    cancel: &CancellationToken,
    url: &str,
    destination: &Destination,
    body: &T,
) -> Result<reqwest::Response, SendError> {
    let mut request = client.post(url).json(body);
    for (name, value) in destination.custom_headers() {
        request = request.header(name, value);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SendError::Cancelled),
        result = request.send() => result.map_err(|e| SendError::Transport(e.to_string())),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process chat platform stand-in.

    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::{RawQuery, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use chrono::Utc;
    use serde_json::Value;

    use mergealert_entity::destination::{Destination, DestinationSettings};

    /// One request seen by the fake platform.
    #[derive(Debug, Clone)]
    pub struct Captured {
        pub query: Option<String>,
        pub headers: HeaderMap,
        pub body: Value,
    }

    #[derive(Clone)]
    struct FakeState {
        captured: Arc<Mutex<Vec<Captured>>>,
        status: StatusCode,
        reply: Value,
    }

    /// Handle to a running fake platform.
    pub struct FakePlatform {
        pub url: String,
        captured: Arc<Mutex<Vec<Captured>>>,
    }

    impl FakePlatform {
        pub fn requests(&self) -> Vec<Captured> {
            self.captured.lock().unwrap().clone()
        }
    }

    /// Start a server answering every POST to `/robot/send` with
    /// `status` and `reply`.
    pub async fn spawn(status: StatusCode, reply: Value) -> FakePlatform {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState {
            captured: Arc::clone(&captured),
            status,
            reply,
        };

        async fn handle(
            State(state): State<FakeState>,
            RawQuery(query): RawQuery,
            headers: HeaderMap,
            body: String,
        ) -> (StatusCode, String) {
            let body = serde_json::from_str(&body).unwrap_or(Value::Null);
            state.captured.lock().unwrap().push(Captured {
                query,
                headers,
                body,
            });
            (state.status, state.reply.to_string())
        }

        let app = Router::new()
            .route("/robot/send", post(handle))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakePlatform {
            url: format!("http://{addr}/robot/send?access_token=abc"),
            captured,
        }
    }

    pub fn destination(id: i64, channel_type: &str, url: &str) -> Destination {
        Destination {
            id,
            name: format!("dest-{id}"),
            url: url.to_string(),
            description: None,
            channel_type: channel_type.to_string(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            settings: Some(DestinationSettings::default()),
        }
    }
}
