//! Gateway Service
//!
//! One downstream request becomes at most one upstream connection. The
//! downstream body is a pull-driven stream: upstream bytes are read only when
//! the downstream asks for more, so a stalled browser stalls the upstream read
//! and nothing is buffered beyond one chunk. Dropping the body (the browser
//! went away) drops the upstream stream with it.
//!
//! ```text
//! Connect ──open ok──► Streaming ──EOF──────────► end
//!    │                    │ ──error/shutdown──► error frame, end
//!    └──error/shutdown──► error frame, end
//! ```

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use bytes::Bytes;
use futures::{Stream, StreamExt, future, stream};
use location_protocol::frame::trim_line_end;
use location_protocol::{FilterError, FilterSpec, LineBuffer};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{ByteStream, UpstreamRequest, UpstreamSource};
use crate::domain::StreamFailure;
use crate::infrastructure::metrics;

/// Body stream handed to the HTTP layer.
pub type DownstreamStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

// =============================================================================
// Active Upstream Tracking
// =============================================================================

/// Count of live upstream connections.
#[derive(Debug, Clone, Default)]
pub struct ActiveUpstreams {
    count: Arc<AtomicUsize>,
}

impl ActiveUpstreams {
    /// Start at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of live upstream connections.
    #[must_use]
    pub fn current(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    fn acquire(&self, stream_id: Uuid) -> UpstreamLease {
        let now = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::set_active_upstreams(now);
        UpstreamLease {
            count: Arc::clone(&self.count),
            opened_at: Instant::now(),
            stream_id,
        }
    }
}

/// Held from the start of an upstream connect until the connection is gone.
struct UpstreamLease {
    count: Arc<AtomicUsize>,
    opened_at: Instant,
    stream_id: Uuid,
}

impl Drop for UpstreamLease {
    fn drop(&mut self) {
        let remaining = self.count.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        metrics::set_active_upstreams(remaining);
        metrics::record_stream_duration(self.opened_at.elapsed());
        tracing::debug!(
            stream_id = %self.stream_id,
            elapsed_ms = self.opened_at.elapsed().as_millis(),
            remaining,
            "Upstream connection released"
        );
    }
}

// =============================================================================
// Gateway Service
// =============================================================================

/// Builds proxied downstream streams.
pub struct GatewayService {
    source: Option<Arc<dyn UpstreamSource>>,
    active: ActiveUpstreams,
    shutdown: CancellationToken,
    debug_mode: bool,
}

impl GatewayService {
    /// Create a gateway. `source` is `None` when no credential is configured.
    #[must_use]
    pub fn new(source: Option<Arc<dyn UpstreamSource>>, shutdown: CancellationToken) -> Self {
        Self {
            source,
            active: ActiveUpstreams::new(),
            shutdown,
            debug_mode: false,
        }
    }

    /// Log filter values instead of counts.
    #[must_use]
    pub const fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    /// Whether an upstream credential is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// Shared live-upstream counter.
    #[must_use]
    pub fn active_upstreams(&self) -> ActiveUpstreams {
        self.active.clone()
    }

    /// Build the downstream body for one request.
    ///
    /// `raw_query` is forwarded verbatim; `filter` is its parsed form and is
    /// only used to reject bad requests before any upstream call.
    pub fn open(
        &self,
        raw_query: Option<String>,
        filter: Result<FilterSpec, FilterError>,
    ) -> DownstreamStream {
        let stream_id = Uuid::new_v4();
        metrics::record_stream_opened();

        let spec = match filter {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(%stream_id, error = %e, "Rejected stream request");
                return single_failure(stream_id, &StreamFailure::InvalidFilter(e));
            }
        };

        let Some(source) = self.source.clone() else {
            tracing::error!(
                %stream_id,
                "Stream requested but the upstream credential is not configured"
            );
            return single_failure(stream_id, &StreamFailure::NotConfigured);
        };

        self.log_filter(stream_id, &spec);

        let state = ProxyState {
            phase: Phase::Connect {
                source,
                request: UpstreamRequest::new(raw_query),
            },
            shutdown: self.shutdown.clone(),
            active: self.active.clone(),
            stream_id,
        };
        Box::pin(stream::unfold(state, ProxyState::step))
    }

    fn log_filter(&self, stream_id: Uuid, spec: &FilterSpec) {
        if self.debug_mode {
            tracing::debug!(
                %stream_id,
                all = spec.include_all,
                users = ?spec.users,
                devices = ?spec.devices,
                since = ?spec.resume_cursor,
                heartbeat = spec.heartbeat_secs,
                limit = spec.max_points_per_cycle,
                "Opening upstream stream"
            );
        } else {
            tracing::info!(
                %stream_id,
                all = spec.include_all,
                users = spec.users.len(),
                devices = spec.devices.len(),
                resumed = spec.resume_cursor.is_some(),
                "Opening upstream stream"
            );
        }
    }
}

fn single_failure(stream_id: Uuid, failure: &StreamFailure) -> DownstreamStream {
    let frame = failure_frame(stream_id, failure, false);
    Box::pin(stream::once(future::ready(Ok(frame))))
}

fn failure_frame(stream_id: Uuid, failure: &StreamFailure, in_event: bool) -> Bytes {
    let code = failure.code();
    metrics::record_stream_error(&code);
    tracing::warn!(
        %stream_id,
        code = %code,
        message = %failure.message(),
        "Ending stream with error frame"
    );

    let frame = failure.to_frame();
    if in_event {
        Bytes::from(format!("\n{frame}"))
    } else {
        Bytes::from(frame)
    }
}

// =============================================================================
// Proxy State Machine
// =============================================================================

struct ProxyState {
    phase: Phase,
    shutdown: CancellationToken,
    active: ActiveUpstreams,
    stream_id: Uuid,
}

enum Phase {
    Connect {
        source: Arc<dyn UpstreamSource>,
        request: UpstreamRequest,
    },
    Streaming(Upstream),
    Done,
}

struct Upstream {
    body: ByteStream,
    lines: LineBuffer,
    in_event: bool,
    _lease: UpstreamLease,
}

impl Upstream {
    /// Complete lines from `chunk`, or `None` if it completed none.
    fn forward(&mut self, chunk: &[u8]) -> Option<Bytes> {
        let lines = self.lines.push(chunk);
        if lines.is_empty() {
            return None;
        }

        let mut out = Vec::with_capacity(lines.iter().map(Vec::len).sum());
        for line in &lines {
            match trim_line_end(line) {
                [] => self.in_event = false,
                [b':', ..] => {}
                _ => self.in_event = true,
            }
            out.extend_from_slice(line);
        }
        metrics::record_lines_forwarded(lines.len() as u64);
        Some(Bytes::from(out))
    }
}

impl ProxyState {
    async fn step(mut self) -> Option<(Result<Bytes, Infallible>, Self)> {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,

                Phase::Connect { source, request } => {
                    let lease = self.active.acquire(self.stream_id);
                    let opened = tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => Err(StreamFailure::Shutdown),
                        result = source.open(request) => result.map_err(StreamFailure::from),
                    };

                    match opened {
                        Ok(body) => {
                            tracing::info!(stream_id = %self.stream_id, "Upstream stream opened");
                            self.phase = Phase::Streaming(Upstream {
                                body,
                                lines: LineBuffer::new(),
                                in_event: false,
                                _lease: lease,
                            });
                        }
                        Err(failure) => {
                            let frame = failure_frame(self.stream_id, &failure, false);
                            return Some((Ok(frame), self));
                        }
                    }
                }

                Phase::Streaming(mut upstream) => {
                    let next = tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => Err(StreamFailure::Shutdown),
                        chunk = upstream.body.next() => Ok(chunk),
                    };

                    match next {
                        Ok(Some(Ok(chunk))) => {
                            let forwarded = upstream.forward(&chunk);
                            self.phase = Phase::Streaming(upstream);
                            if let Some(bytes) = forwarded {
                                return Some((Ok(bytes), self));
                            }
                        }
                        Ok(None) => {
                            tracing::info!(
                                stream_id = %self.stream_id,
                                discarded_partial = upstream.lines.has_partial(),
                                "Upstream stream ended"
                            );
                            return None;
                        }
                        Ok(Some(Err(err))) => {
                            let in_event = upstream.in_event;
                            drop(upstream);
                            let frame =
                                failure_frame(self.stream_id, &StreamFailure::from(err), in_event);
                            return Some((Ok(frame), self));
                        }
                        Err(failure) => {
                            let in_event = upstream.in_event;
                            drop(upstream);
                            let frame = failure_frame(self.stream_id, &failure, in_event);
                            return Some((Ok(frame), self));
                        }
                    }
                }
            }
        }
    }
}
