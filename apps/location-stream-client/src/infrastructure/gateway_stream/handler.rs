//! Observer interface for subscriptions.

use async_trait::async_trait;
use location_protocol::{
    ClosedEvent, CodecError, ConnectedEvent, EventId, HeartbeatEvent, PointEvent,
    StreamErrorEvent, StreamEvent,
};

use super::subscription::{ClientEvent, ConnectionState, Subscription, SubscriptionHandle};

/// One callback per event variant. Every method defaults to a no-op.
///
/// Each callback gets the subscription's handle, so a handler may close the
/// subscription or change its filter from inside a callback. Nothing is
/// delivered after `close()` returns.
#[async_trait]
pub trait SubscriptionHandler: Send {
    /// A location sample.
    async fn on_point(
        &mut self,
        _handle: &SubscriptionHandle,
        _id: Option<EventId>,
        _point: PointEvent,
    ) {
    }

    /// A liveness frame.
    async fn on_heartbeat(
        &mut self,
        _handle: &SubscriptionHandle,
        _id: Option<EventId>,
        _heartbeat: HeartbeatEvent,
    ) {
    }

    /// The upstream accepted the subscription.
    async fn on_connected(&mut self, _handle: &SubscriptionHandle, _connected: ConnectedEvent) {}

    /// A protocol-level error from the gateway.
    async fn on_error(&mut self, _handle: &SubscriptionHandle, _error: StreamErrorEvent) {}

    /// The session ended and will not be retried.
    async fn on_closed(&mut self, _handle: &SubscriptionHandle, _closed: ClosedEvent) {}

    /// Connection state changed.
    async fn on_state(&mut self, _handle: &SubscriptionHandle, _state: ConnectionState) {}

    /// A frame could not be decoded and was dropped.
    async fn on_internal_error(&mut self, _handle: &SubscriptionHandle, _error: CodecError) {}
}

/// Feed every event of `subscription` to `handler`, in order.
pub(crate) async fn dispatch<H>(mut subscription: Subscription, mut handler: H)
where
    H: SubscriptionHandler,
{
    let handle = subscription.handle();
    while let Some(event) = subscription.next().await {
        match event {
            ClientEvent::State(state) => handler.on_state(&handle, state).await,
            ClientEvent::InternalError(error) => handler.on_internal_error(&handle, error).await,
            ClientEvent::Event(envelope) => match envelope.event {
                StreamEvent::Point(point) => handler.on_point(&handle, envelope.id, point).await,
                StreamEvent::Heartbeat(heartbeat) => {
                    handler.on_heartbeat(&handle, envelope.id, heartbeat).await;
                }
                StreamEvent::Connected(connected) => handler.on_connected(&handle, connected).await,
                StreamEvent::Error(error) => handler.on_error(&handle, error).await,
                StreamEvent::Closed(closed) => handler.on_closed(&handle, closed).await,
            },
        }
    }
    tracing::debug!(subscription = handle.id(), "Handler dispatch finished");
}
