//! Subscriptions
//!
//! A [`Subscription`] is the caller-owned end of one background connection
//! driver. Events arrive through an unbounded ordered queue, so a slow
//! consumer never stalls frame parsing and never sees events reordered.
//! A [`SubscriptionHandle`] is a cloneable control for the same driver.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use location_protocol::{CodecError, EventEnvelope, FilterSpec};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::ClientError;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a subscription's connection.
///
/// ```text
/// Idle → Connecting → Open ⇄ Reconnecting
///                      └──────────┴──→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, driver not started yet.
    Idle,
    /// First connection attempt in progress.
    Connecting,
    /// Stream is open and delivering events.
    Open,
    /// Connection lost; backing off or retrying.
    Reconnecting,
    /// Terminal. A new subscription is needed to stream again.
    Closed,
}

impl ConnectionState {
    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

// =============================================================================
// Client Events
// =============================================================================

/// Items delivered to a subscriber, in stream order.
#[derive(Debug)]
pub enum ClientEvent {
    /// Connection state changed.
    State(ConnectionState),
    /// A decoded stream event with its id.
    Event(EventEnvelope),
    /// A frame whose payload could not be decoded; the stream continues.
    InternalError(CodecError),
}

/// Requests from handles to the driver.
#[derive(Debug)]
pub(crate) enum Control {
    UpdateFilter(FilterSpec),
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: u64,
    state: Mutex<ConnectionState>,
    closed: AtomicBool,
    cancel: CancellationToken,
    control: mpsc::UnboundedSender<Control>,
}

impl Shared {
    pub(crate) fn new(id: u64, control: mpsc::UnboundedSender<Control>) -> Self {
        Self {
            id,
            state: Mutex::new(ConnectionState::Idle),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            control,
        }
    }

    /// Whether `close()` has been called.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record a transition. Returns false if nothing changed or the
    /// subscription was already closed.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == next || state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Cloneable control for a running subscription.
///
/// Safe to use from any task, including from inside event handlers.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    shared: Arc<Shared>,
}

impl SubscriptionHandle {
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Stop the subscription.
    ///
    /// Idempotent. No event is delivered after this returns, and the
    /// connection is released by the driver without further reads.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.shared.state.lock() = ConnectionState::Closed;
        self.shared.cancel.cancel();
        tracing::debug!(subscription = self.shared.id, "Subscription closed by caller");
    }

    /// Replace the filter.
    ///
    /// The current connection is torn down before a connection with the new
    /// filter is opened; the resume cursor starts over.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid or the subscription is closed.
    pub fn update_filter(&self, spec: FilterSpec) -> Result<(), ClientError> {
        spec.validate()?;
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        self.shared
            .control
            .send(Control::UpdateFilter(spec))
            .map_err(|_| ClientError::Closed)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Whether the subscription has reached `Closed`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_terminal()
    }

    /// Process-unique subscription number, used in logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Caller-owned stream of [`ClientEvent`]s. Dropping it closes the
/// subscription.
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Subscription {
    pub(crate) const fn new(
        handle: SubscriptionHandle,
        events: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> Self {
        Self { handle, events }
    }

    /// Next event, or `None` once the subscription is closed and drained.
    ///
    /// After [`close`](Self::close) this returns `None` immediately, even if
    /// events were still queued.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        if self.handle.shared.is_closed() {
            return None;
        }
        let cancel = self.handle.shared.cancel_token();
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            event = self.events.recv() => event.filter(|_| !self.handle.shared.is_closed()),
        }
    }

    /// Control handle for this subscription.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// See [`SubscriptionHandle::close`].
    pub fn close(&self) {
        self.handle.close();
    }

    /// See [`SubscriptionHandle::update_filter`].
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid or the subscription is closed.
    pub fn update_filter(&self, spec: FilterSpec) -> Result<(), ClientError> {
        self.handle.update_filter(spec)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }
}

impl Stream for Subscription {
    type Item = ClientEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.handle.shared.is_closed() {
            return Poll::Ready(None);
        }
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.close();
    }
}
