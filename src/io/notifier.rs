//! Closed-ticket notifications
//!
//! Backends: Telegram bot message, MQTT publish, or log only. Delivery is
//! best-effort; the notification worker owns retries (none) and accounting.

use crate::domain::ticket::{format_money, ClosedTicket};
use crate::infra::config::{Config, NotifyMode};
use anyhow::{bail, Context};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("notification rejected with status {0}")]
    Rejected(u16),
    #[error("notification payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Everything a backend needs to announce one closed ticket
#[derive(Debug, Clone, Serialize)]
pub struct TicketNotice {
    pub site: String,
    #[serde(flatten)]
    pub ticket: ClosedTicket,
    pub fee: String,
    pub text: String,
}

impl TicketNotice {
    pub fn new(site: &str, ticket: ClosedTicket, currency: &str) -> Self {
        let text = ticket.notification_text(currency);
        let fee = format_money(ticket.fee_cents, currency);
        Self { site: site.to_string(), ticket, fee, text }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notice: &TicketNotice) -> Result<(), NotifyError>;
}

/// Writes the notification text to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notice: &TicketNotice) -> Result<(), NotifyError> {
        info!(
            site = %notice.site,
            ticket_ref = %notice.ticket.ticket_ref,
            text = %notice.text,
            "ticket_notification"
        );
        Ok(())
    }
}

/// Telegram Bot API `sendMessage`
pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api: &str, token: &str, chat_id: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/bot{}/sendMessage", api.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, notice: &TicketNotice) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", notice.text.as_str())])
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Publishes the notice as JSON at QoS 1
///
/// A send fails fast while the broker is unreachable and is bounded by
/// `notify.timeout_ms` otherwise, so a dead broker never wedges the worker.
pub struct MqttNotifier {
    client: AsyncClient,
    topic: String,
    timeout: Duration,
    /// Set on ConnAck, cleared on any event loop error
    connected: Arc<AtomicBool>,
}

impl MqttNotifier {
    /// Connect to the broker. Must be called from within a tokio runtime.
    pub fn new(config: &Config) -> Self {
        let client_id = format!("parking-bay-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 32);
        let connected = Arc::new(AtomicBool::new(false));

        let link_state = connected.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        link_state.store(true, Ordering::Relaxed);
                        info!("mqtt_notify_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_notify_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if link_state.swap(false, Ordering::Relaxed) {
                            warn!(error = %e, "mqtt_notify_disconnected");
                        } else {
                            debug!(error = %e, "mqtt_notify_error");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            topic: config.mqtt_topic().to_string(),
            timeout: Duration::from_millis(config.notify_timeout_ms()),
            connected,
        }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn send(&self, notice: &TicketNotice) -> Result<(), NotifyError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(NotifyError::Transport("broker not connected".to_string()));
        }
        let json = serde_json::to_vec(notice)?;
        let publish = self.client.publish(&self.topic, QoS::AtLeastOnce, false, json);
        match tokio::time::timeout(self.timeout, publish).await {
            Ok(result) => result.map_err(|e| NotifyError::Transport(e.to_string())),
            Err(_) => Err(NotifyError::Transport("publish timed out".to_string())),
        }
    }
}

/// Build the configured backend
pub fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match config.notify_mode() {
        NotifyMode::Log => Arc::new(LogNotifier),
        NotifyMode::Telegram => {
            let (Some(token), Some(chat_id)) = (config.telegram_token(), config.telegram_chat_id())
            else {
                bail!("notify.mode = \"telegram\" requires telegram_token and telegram_chat_id");
            };
            Arc::new(TelegramNotifier::new(
                config.telegram_api(),
                token,
                chat_id,
                Duration::from_millis(config.notify_timeout_ms()),
            )?)
        }
        NotifyMode::Mqtt => Arc::new(MqttNotifier::new(config)),
    };
    info!(backend = notifier.name(), "notifier_ready");
    Ok(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SlotId, SlotIndex};
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use parking_lot::Mutex;
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    fn sample_ticket() -> ClosedTicket {
        ClosedTicket {
            ticket_ref: "0192-test".to_string(),
            id: SlotId(2),
            slot_index: SlotIndex(1),
            time_in_epoch_ms: 1_000,
            time_out_epoch_ms: 151_000,
            duration_ms: 150_000,
            billed_minutes: 3,
            fee_cents: 150,
            closed: true,
        }
    }

    #[test]
    fn test_notice_text_and_json() {
        let notice = TicketNotice::new("bay-1", sample_ticket(), "$");
        assert!(notice.text.contains("ID: 2 Slot: S2"));
        assert!(notice.text.contains("Fee: $1.50"));

        let json: serde_json::Value = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["site"], "bay-1");
        assert_eq!(json["fee"], "$1.50");
        assert_eq!(json["billed_minutes"], 3);
        assert_eq!(json["ticket_ref"], "0192-test");
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notice = TicketNotice::new("bay-1", sample_ticket(), "$");
        assert!(LogNotifier.send(&notice).await.is_ok());
    }

    #[test]
    fn test_telegram_requires_credentials() {
        let config = Config::from_toml_str("[notify]\nmode = \"telegram\"\n", "test").unwrap();
        assert!(build_notifier(&config).is_err());
    }

    #[test]
    fn test_telegram_url() {
        let n = TelegramNotifier::new("https://api.example/", "T0K", "42", Duration::from_secs(1))
            .unwrap();
        assert_eq!(n.url, "https://api.example/botT0K/sendMessage");
    }

    /// Local stand-in for the Bot API: answers every request with `status`
    /// and records "path body" for each one
    async fn bot_api(status: StatusCode) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let requests = seen.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let requests = requests.clone();
                let service = service_fn(move |req: Request<Incoming>| {
                    let requests = requests.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let body = req
                            .into_body()
                            .collect()
                            .await
                            .map(|b| b.to_bytes())
                            .unwrap_or_default();
                        let line = format!("{path} {}", String::from_utf8_lossy(&body));
                        requests.lock().push(line);
                        let mut resp = Response::new(Full::new(Bytes::from_static(b"{}")));
                        *resp.status_mut() = status;
                        Ok::<_, Infallible>(resp)
                    }
                });
                let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                tokio::spawn(async move {
                    let _ = conn.await;
                });
            }
        });

        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn test_telegram_posts_form_to_bot_endpoint() {
        let (api, seen) = bot_api(StatusCode::OK).await;
        let n = TelegramNotifier::new(&api, "T0K", "42", Duration::from_secs(2)).unwrap();

        n.send(&TicketNotice::new("bay-1", sample_ticket(), "$")).await.unwrap();

        let requests = seen.lock().clone();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("/botT0K/sendMessage "));
        assert!(requests[0].contains("chat_id=42"));
        assert!(requests[0].contains("text="));
    }

    #[tokio::test]
    async fn test_telegram_non_success_is_rejected() {
        let (api, _seen) = bot_api(StatusCode::FORBIDDEN).await;
        let n = TelegramNotifier::new(&api, "T0K", "42", Duration::from_secs(2)).unwrap();

        let result = n.send(&TicketNotice::new("bay-1", sample_ticket(), "$")).await;
        assert!(matches!(result, Err(NotifyError::Rejected(403))));
    }

    #[tokio::test]
    async fn test_telegram_unreachable_is_transport_error() {
        let n = TelegramNotifier::new("http://127.0.0.1:1", "T0K", "42", Duration::from_secs(2))
            .unwrap();

        let result = n.send(&TicketNotice::new("bay-1", sample_ticket(), "$")).await;
        assert!(matches!(result, Err(NotifyError::Transport(_))));
    }

    #[tokio::test]
    async fn test_mqtt_send_fails_fast_without_broker() {
        let toml = r#"
[notify]
mode = "mqtt"
mqtt_host = "127.0.0.1"
mqtt_port = 1
timeout_ms = 200
"#;
        let config = Config::from_toml_str(toml, "test").unwrap();
        let n = MqttNotifier::new(&config);
        let notice = TicketNotice::new("bay-1", sample_ticket(), "$");

        // More sends than the client's request channel holds
        for i in 0..40 {
            let result = tokio::time::timeout(Duration::from_secs(3), n.send(&notice))
                .await
                .unwrap_or_else(|_| panic!("send #{i} hung"));
            assert!(matches!(result, Err(NotifyError::Transport(_))), "send #{i} reported success");
        }
    }
}
