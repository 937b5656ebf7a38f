//! Movement Feed
//!
//! Subscription handler that classifies every point and forwards the result
//! to the rendering side over a channel.

use std::sync::Arc;

use async_trait::async_trait;
use location_protocol::{ClosedEvent, CodecError, EventId, PointEvent, StreamErrorEvent};
use tokio::sync::mpsc;

use crate::domain::movement::{Classification, MovementTracker};
use crate::infrastructure::gateway_stream::{
    ConnectionState, SubscriptionHandle, SubscriptionHandler,
};

/// A point with its classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPoint {
    /// Event id the point arrived with.
    pub id: Option<EventId>,
    /// The point.
    pub point: PointEvent,
    /// Tag and resulting device state.
    pub classification: Classification,
}

/// Feeds subscription points into a [`MovementTracker`].
pub struct MovementFeed {
    tracker: Arc<MovementTracker>,
    output: mpsc::UnboundedSender<ClassifiedPoint>,
}

impl MovementFeed {
    /// Feed into `tracker`, sending results to `output`.
    #[must_use]
    pub const fn new(
        tracker: Arc<MovementTracker>,
        output: mpsc::UnboundedSender<ClassifiedPoint>,
    ) -> Self {
        Self { tracker, output }
    }
}

#[async_trait]
impl SubscriptionHandler for MovementFeed {
    async fn on_point(
        &mut self,
        handle: &SubscriptionHandle,
        id: Option<EventId>,
        point: PointEvent,
    ) {
        let classification = match self.tracker.observe(&point) {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(
                    device = %point.device_id,
                    error = %e,
                    "Point rejected by classifier"
                );
                return;
            }
        };

        let classified = ClassifiedPoint {
            id,
            point,
            classification,
        };
        if self.output.send(classified).is_err() {
            tracing::debug!("Movement output closed, stopping subscription");
            handle.close();
        }
    }

    async fn on_error(&mut self, _handle: &SubscriptionHandle, error: StreamErrorEvent) {
        tracing::warn!(code = %error.code, message = %error.message, "Stream error");
    }

    async fn on_closed(&mut self, _handle: &SubscriptionHandle, closed: ClosedEvent) {
        tracing::info!(reason = %closed.reason, "Stream closed");
    }

    async fn on_state(&mut self, _handle: &SubscriptionHandle, state: ConnectionState) {
        tracing::info!(state = ?state, "Connection state changed");
    }

    async fn on_internal_error(&mut self, _handle: &SubscriptionHandle, error: CodecError) {
        tracing::warn!(error = %error, "Undecodable event dropped");
    }
}
