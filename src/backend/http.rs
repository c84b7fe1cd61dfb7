//! HTTP gateway transport.
//!
//! Speaks a generic JSON gateway protocol: outbound texts are POSTed to the
//! gateway's send endpoint, and the run loop polls its events endpoint,
//! forwarding message and delivery-report events toward the router. Which
//! gateway sits on the other side is the gateway's business — anything that
//! answers this shape plugs in.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::messages::DeliveryReport;

use super::{
    BackendError, Inbound, InboundPayload, OutboundPayload, RunContext, Transport,
};

/// HTTP connect timeout.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for sends and polls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Pause between successful polls, in milliseconds.
const POLL_INTERVAL_MS: u64 = 1_000;

/// Initial backoff on poll failure, in milliseconds.
const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff on poll failure, in milliseconds.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Gateway endpoints for one HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGatewayConfig {
    /// Backend name; must match a configured `backends` row.
    pub name: String,
    /// URL outbound payloads are POSTed to.
    pub outbound_url: String,
    /// URL the run loop polls for inbound events.
    pub poll_url: String,
}

/// Outbound body POSTed to the gateway.
#[derive(Debug, Serialize)]
struct GatewaySend<'a> {
    identity: &'a str,
    text: &'a str,
}

/// Poll response envelope from the gateway.
#[derive(Debug, Deserialize)]
struct GatewayPoll {
    events: Vec<GatewayEvent>,
}

/// One event in a gateway poll body.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum GatewayEvent {
    /// An inbound text from the network.
    Message {
        identity: String,
        text: String,
    },
    /// A delivery callback for a previously sent message.
    DeliveryReport {
        action: String,
        report_id: String,
        number: String,
        report: String,
    },
}

/// Transport speaking the JSON gateway protocol over HTTP.
pub struct HttpTransport {
    config: HttpGatewayConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport for the given gateway endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Http`] if the HTTP client cannot be built.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { config, client })
    }

    /// One poll of the gateway's events endpoint.
    async fn poll_events(&self) -> Result<Vec<GatewayEvent>, BackendError> {
        let response = self
            .client
            .get(&self.config.poll_url)
            .send()
            .await?
            .error_for_status()?;
        let body: GatewayPoll = response.json().await?;
        Ok(body.events)
    }

    /// Translate a gateway event into router-bound traffic.
    fn normalize(&self, event: GatewayEvent) -> Inbound {
        match event {
            GatewayEvent::Message { identity, text } => {
                Inbound::Message(InboundPayload::now(&self.config.name, &identity, &text))
            }
            GatewayEvent::DeliveryReport {
                action,
                report_id,
                number,
                report,
            } => Inbound::Report(DeliveryReport {
                action,
                report_id,
                number,
                report,
            }),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn run(&self, ctx: RunContext) -> Result<(), BackendError> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        while ctx.is_running() {
            match self.poll_events().await {
                Ok(events) => {
                    backoff_ms = INITIAL_BACKOFF_MS;
                    for event in events {
                        ctx.forward(self.normalize(event)).await?;
                    }
                    tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
                Err(e) => {
                    warn!(
                        backend = %self.config.name,
                        error = %e,
                        backoff_ms,
                        "gateway poll failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms.saturating_mul(2)).min(MAX_BACKOFF_MS);
                }
            }
        }
        Ok(())
    }

    async fn send(&self, payload: &OutboundPayload) -> Result<bool, BackendError> {
        let response = self
            .client
            .post(&self.config.outbound_url)
            .json(&GatewaySend {
                identity: &payload.identity,
                text: &payload.text,
            })
            .send()
            .await?;
        let accepted = response.status().is_success();
        debug!(
            backend = %self.config.name,
            identity = %payload.identity,
            status = %response.status(),
            "gateway send"
        );
        Ok(accepted)
    }

    async fn receive(&self, _payload: &InboundPayload) -> Result<(), BackendError> {
        // Inbound gateway traffic needs no post-processing beyond the
        // router's logging.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_body_parses_messages_and_reports() {
        let body = r#"{
            "events": [
                {"kind": "message", "identity": "+15551234567", "text": "hi"},
                {"kind": "delivery-report", "action": "delivered",
                 "report_id": "r-1", "number": "+15551234567", "report": "ok"}
            ]
        }"#;
        let poll: GatewayPoll = serde_json::from_str(body).expect("parse");
        assert_eq!(poll.events.len(), 2);
        assert!(matches!(poll.events[0], GatewayEvent::Message { .. }));
        assert!(matches!(poll.events[1], GatewayEvent::DeliveryReport { .. }));
    }

    #[test]
    fn send_body_shape() {
        let body = serde_json::to_value(GatewaySend {
            identity: "+15551234567",
            text: "hello",
        })
        .expect("serialize");
        assert_eq!(body["identity"], "+15551234567");
        assert_eq!(body["text"], "hello");
    }
}
