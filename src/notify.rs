use crate::error::{Result, SorterError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Outbound notification channel. Delivery is best-effort: the sorter logs
/// failures and never lets them change a relocation outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Slack notifier posting to `chat.postMessage`, with a bounded number of
/// retries and a fixed delay between attempts.
pub struct SlackNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
    channel: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl SlackNotifier {
    pub fn new(token: String, channel: String, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: SLACK_API_BASE.to_string(),
            token,
            channel,
            max_retries,
            retry_delay,
        }
    }

    /// Point the notifier at a different API host, for tests or a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_message(&self, message: &str) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "channel": self.channel,
                "text": message,
            }))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(SorterError::Notification(format!(
                "Slack responded with status {}",
                res.status().as_u16()
            )));
        }

        // Slack signals API-level failure in the body with 200 status
        let body: serde_json::Value = res.json().await?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let reason = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(SorterError::Notification(format!(
                "Slack rejected message: {reason}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.post_message(message).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Slack delivery attempt {}/{} failed: {}",
                        attempt, self.max_retries, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering every request with a fixed response
    /// and counting the requests it saw.
    async fn spawn_server(response: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    fn notifier_for(addr: SocketAddr, max_retries: u32) -> SlackNotifier {
        SlackNotifier::new(
            "xoxb-test".to_string(),
            "#sdc-alerts".to_string(),
            max_retries,
            Duration::from_millis(1),
        )
        .with_base_url(format!("http://{addr}"))
    }

    #[tokio::test]
    async fn delivers_when_slack_accepts() {
        let (addr, hits) = spawn_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\nContent-Length: 11\r\n\r\n{\"ok\":true}",
        )
        .await;

        let result = notifier_for(addr, 3).send("File sorted").await;

        assert!(result.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_the_configured_count_then_gives_up() {
        let (addr, hits) = spawn_server(
            "HTTP/1.1 500 Internal Server Error\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        )
        .await;

        let err = notifier_for(addr, 2).send("File sorted").await.unwrap_err();

        assert!(matches!(err, SorterError::Notification(_)));
        // initial attempt plus max_retries retries
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn api_level_rejection_is_a_notification_error() {
        let (addr, hits) = spawn_server(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\nContent-Length: 40\r\n\r\n{\"ok\":false,\"error\":\"channel_not_found\"}",
        )
        .await;

        let err = notifier_for(addr, 0).send("File sorted").await.unwrap_err();

        assert!(matches!(err, SorterError::Notification(ref m) if m.contains("channel_not_found")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
