//! Connection Driver
//!
//! Background task behind one subscription. Owns the connection, the frame
//! decoder, the resume cursor, and the reconnect policy; talks to the caller
//! only through the ordered event queue and the shared state.
//!
//! # Resume
//!
//! The cursor is the highest event position seen so far and is sent as
//! `since` on every reconnect. On a resumed connection, events at or below
//! the position the connection resumed from are dropped, so nothing the
//! subscriber already saw is delivered twice.
//!
//! # Reconnect budget
//!
//! The gateway answers 200 even when its upstream is down and reports the
//! failure in-band, so an open connection proves nothing. The budget is
//! restored only when a connection delivers a point, heartbeat, or
//! connected event.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use location_protocol::{
    ClosedEvent, Decoded, EventEnvelope, EventPosition, FilterSpec, FrameDecoder, StreamEvent,
    decode_frame,
};
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::mpsc;

use super::config::ClientConfig;
use super::error::ClientError;
use super::liveness::Liveness;
use super::reconnect::ReconnectPolicy;
use super::subscription::{ClientEvent, ConnectionState, Control, Shared};

/// Close reason delivered when the reconnect budget runs out.
pub const RETRIES_EXHAUSTED: &str = "retries_exhausted";

/// How a connection attempt or open connection ended.
#[derive(Debug)]
enum Outcome {
    /// Caller closed the subscription.
    Cancelled,
    /// Caller replaced the filter.
    FilterChanged(FilterSpec),
    /// Session ended intentionally; do not reconnect.
    Finished,
    /// Connection lost; reconnect if the budget allows.
    Lost(ClientError),
}

/// What happened to one delivered event.
enum Delivery {
    Continue,
    Finished,
    Cancelled,
}

pub(crate) struct Driver {
    http: reqwest::Client,
    gateway_url: Url,
    config: Arc<ClientConfig>,
    spec: FilterSpec,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<ClientEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    cursor: Option<EventPosition>,
    policy: ReconnectPolicy,
}

impl Driver {
    pub(crate) fn new(
        http: reqwest::Client,
        gateway_url: Url,
        config: Arc<ClientConfig>,
        spec: FilterSpec,
        shared: Arc<Shared>,
        events: mpsc::UnboundedSender<ClientEvent>,
        control: mpsc::UnboundedReceiver<Control>,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.reconnect.clone());
        let cursor = initial_cursor(&spec);
        Self {
            http,
            gateway_url,
            config,
            spec,
            shared,
            events,
            control,
            cursor,
            policy,
        }
    }

    /// Run until the subscription closes.
    pub(crate) async fn run(mut self) {
        let id = self.shared.id;
        self.set_state(ConnectionState::Connecting);

        loop {
            match self.connection().await {
                Outcome::Cancelled => break,
                Outcome::FilterChanged(spec) => self.replace_filter(spec),
                Outcome::Finished => {
                    self.set_state(ConnectionState::Closed);
                    break;
                }
                Outcome::Lost(error) => {
                    let Some(delay) = self.policy.next_delay() else {
                        tracing::warn!(
                            subscription = id,
                            attempts = self.policy.attempt_count(),
                            error = %error,
                            "Reconnect attempts exhausted"
                        );
                        self.deliver_closed(RETRIES_EXHAUSTED);
                        self.set_state(ConnectionState::Closed);
                        break;
                    };

                    tracing::warn!(
                        subscription = id,
                        error = %error,
                        attempt = self.policy.attempt_count(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Gateway stream lost, reconnecting"
                    );
                    self.set_state(ConnectionState::Reconnecting);

                    match self.backoff(delay).await {
                        Some(Outcome::Cancelled) => break,
                        Some(Outcome::FilterChanged(spec)) => self.replace_filter(spec),
                        _ => {}
                    }
                }
            }
        }

        tracing::debug!(subscription = id, "Subscription driver stopped");
    }

    /// Wait out a backoff delay. A filter change or close cuts it short.
    async fn backoff(&mut self, delay: std::time::Duration) -> Option<Outcome> {
        let cancel = self.shared.cancel_token();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Some(Outcome::Cancelled),
            Some(Control::UpdateFilter(spec)) = self.control.recv() => {
                Some(Outcome::FilterChanged(spec))
            }
            () = tokio::time::sleep(delay) => None,
        }
    }

    fn replace_filter(&mut self, spec: FilterSpec) {
        tracing::info!(subscription = self.shared.id, "Filter updated, reconnecting");
        self.cursor = initial_cursor(&spec);
        self.spec = spec;
        self.policy.reset();
        self.set_state(ConnectionState::Connecting);
    }

    // =========================================================================
    // One Connection
    // =========================================================================

    /// Connect and read until the connection ends.
    async fn connection(&mut self) -> Outcome {
        let cancel = self.shared.cancel_token();
        let idle_timeout = self.config.idle_timeout_for(&self.spec);
        let resumed_from = self.cursor;
        let url = self.request_url();

        let opening = tokio::time::timeout(idle_timeout, connect(self.http.clone(), url));
        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => return Outcome::Cancelled,
            Some(Control::UpdateFilter(spec)) = self.control.recv() => {
                return Outcome::FilterChanged(spec);
            }
            attempt = opening => attempt,
        };
        let body = match attempt {
            Ok(Ok(response)) => response.bytes_stream(),
            Ok(Err(error)) => return Outcome::Lost(error),
            Err(_) => return Outcome::Lost(ClientError::IdleTimeout(idle_timeout)),
        };

        self.set_state(ConnectionState::Open);
        tracing::info!(
            subscription = self.shared.id,
            resume_cursor = ?resumed_from.map(EventPosition::resume_cursor),
            "Gateway stream open"
        );

        self.read(body, resumed_from, Liveness::new(idle_timeout)).await
    }

    async fn read<S>(
        &mut self,
        body: S,
        resumed_from: Option<EventPosition>,
        mut liveness: Liveness,
    ) -> Outcome
    where
        S: Stream<Item = reqwest::Result<Bytes>>,
    {
        let cancel = self.shared.cancel_token();
        let mut decoder = FrameDecoder::new();
        let mut body = std::pin::pin!(body);

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Outcome::Cancelled,
                Some(Control::UpdateFilter(spec)) = self.control.recv() => {
                    return Outcome::FilterChanged(spec);
                }
                () = liveness.expired() => {
                    return Outcome::Lost(ClientError::IdleTimeout(liveness.idle_timeout()));
                }
                chunk = body.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    return Outcome::Lost(ClientError::Transport {
                        message: e.without_url().to_string(),
                    });
                }
                None => return Outcome::Lost(ClientError::StreamEnded),
            };

            for item in decoder.push(&bytes) {
                if self.shared.is_closed() {
                    return Outcome::Cancelled;
                }
                liveness.record_activity();
                let Decoded::Frame(frame) = item else {
                    continue;
                };
                let delivery = match decode_frame(&frame) {
                    Ok(envelope) => self.deliver(envelope, resumed_from),
                    Err(error) => {
                        tracing::warn!(
                            subscription = self.shared.id,
                            error = %error,
                            "Dropping undecodable event"
                        );
                        self.emit(ClientEvent::InternalError(error))
                    }
                };
                match delivery {
                    Delivery::Continue => {}
                    Delivery::Finished => return Outcome::Finished,
                    Delivery::Cancelled => return Outcome::Cancelled,
                }
            }
        }
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    fn deliver(
        &mut self,
        envelope: EventEnvelope,
        resumed_from: Option<EventPosition>,
    ) -> Delivery {
        let position = envelope
            .id
            .as_ref()
            .and_then(location_protocol::EventId::position);
        if let (Some(position), Some(floor)) = (position, resumed_from)
            && position <= floor
        {
            tracing::debug!(
                subscription = self.shared.id,
                id = ?envelope.id,
                "Skipping event already delivered before reconnect"
            );
            return Delivery::Continue;
        }
        if let Some(position) = position {
            self.cursor = Some(self.cursor.map_or(position, |c| c.max(position)));
        }

        let finished = match &envelope.event {
            StreamEvent::Closed(closed) => {
                tracing::info!(
                    subscription = self.shared.id,
                    reason = %closed.reason,
                    "Gateway closed the session"
                );
                true
            }
            StreamEvent::Error(error) if error.is_terminal() => {
                tracing::error!(
                    subscription = self.shared.id,
                    code = %error.code,
                    message = %error.message,
                    "Terminal stream error"
                );
                true
            }
            StreamEvent::Error(error) => {
                tracing::warn!(
                    subscription = self.shared.id,
                    code = %error.code,
                    message = %error.message,
                    "Retryable stream error"
                );
                false
            }
            StreamEvent::Point(_) | StreamEvent::Heartbeat(_) | StreamEvent::Connected(_) => {
                self.policy.reset();
                false
            }
        };

        match self.emit(ClientEvent::Event(envelope)) {
            Delivery::Continue if finished => Delivery::Finished,
            other => other,
        }
    }

    fn deliver_closed(&self, reason: &str) {
        let _ = self.emit(ClientEvent::Event(EventEnvelope {
            id: None,
            event: StreamEvent::Closed(ClosedEvent {
                reason: reason.to_string(),
            }),
        }));
    }

    fn emit(&self, event: ClientEvent) -> Delivery {
        if self.shared.is_closed() || self.events.send(event).is_err() {
            return Delivery::Cancelled;
        }
        Delivery::Continue
    }

    fn set_state(&self, state: ConnectionState) {
        if self.shared.transition(state) {
            tracing::debug!(subscription = self.shared.id, state = ?state, "Connection state");
            let _ = self.emit(ClientEvent::State(state));
        }
    }

    // =========================================================================
    // Request
    // =========================================================================

    fn request_url(&self) -> Url {
        let spec = self
            .spec
            .clone()
            .with_resume_cursor(self.cursor.map(EventPosition::resume_cursor));
        let mut url = self.gateway_url.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(spec.to_query_pairs());
        url
    }
}

/// Open the gateway stream and check that it is one.
async fn connect(http: reqwest::Client, url: Url) -> Result<reqwest::Response, ClientError> {
    let response = http
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| ClientError::ConnectionFailed {
            message: e.without_url().to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::GatewayStatus {
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("text/event-stream") {
        return Err(ClientError::NotEventStream {
            content_type: content_type.to_string(),
        });
    }

    Ok(response)
}

/// Cursor implied by a caller-supplied `since`: everything in that
/// millisecond and before counts as seen.
fn initial_cursor(spec: &FilterSpec) -> Option<EventPosition> {
    spec.resume_cursor.map(|timestamp_ms| EventPosition {
        timestamp_ms,
        sequence: u64::MAX,
    })
}
