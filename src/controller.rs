use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, trace, warn};

use crate::{
    config::Config,
    error::*,
    estimator,
    policy::AimdPolicy,
    time::{MonotonicClock, TimeSource},
    window::{Totals, WindowAccumulator},
};

/// Identifier of the remote party a controller estimates bandwidth for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives new bandwidth recommendations.
///
/// Handlers run synchronously on the thread that called [`BandwidthController::refresh`], after
/// the controller's lock has been released. They must not block. Calling back into the same
/// controller is allowed.
pub trait EstimateHandler: Send + Sync {
    fn on_estimate_changed(&self, controller: &BandwidthController, peer: PeerId, bandwidth: f32);
}

impl<F> EstimateHandler for F
where
    F: Fn(&BandwidthController, PeerId, f32) + Send + Sync,
{
    fn on_estimate_changed(&self, controller: &BandwidthController, peer: PeerId, bandwidth: f32) {
        self(controller, peer, bandwidth)
    }
}

/// What a call to [`BandwidthController::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshOutcome {
    /// Too soon after the previous evaluation
    RateLimited,
    /// Nothing lost or received within the window
    InsufficientData,
    /// Evaluated, but the estimate is within the configured epsilon of the last notified value
    Unchanged(f32),
    /// Evaluated and the handler was notified of the new estimate
    Changed(f32),
}

/// Point-in-time view of a controller's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub estimate: f32,
    pub totals: Totals,
    pub last_loss_ratio: Option<f32>,
    pub last_throughput: Option<f32>,
    pub refresh_count: u64,
}

struct State {
    window: WindowAccumulator,
    current_estimate: f32,
    /// Last value passed to the handler
    last_notified: f32,
    last_refresh_time: u64,
    last_loss_ratio: Option<f32>,
    last_throughput: Option<f32>,
    refresh_count: u64,
}

/// Per-peer bandwidth estimator.
///
/// Lost and received byte counts are accumulated into a sliding window from the network path,
/// and a periodic [`refresh`](Self::refresh) turns the window's loss ratio into a new
/// recommendation through an [`AimdPolicy`]. All mutable state sits behind one lock per
/// controller, so separate peers never contend.
pub struct BandwidthController {
    peer: PeerId,
    policy: AimdPolicy,
    min_refresh_interval: u64,
    change_epsilon: f32,
    max_event_bytes: u32,
    state: Mutex<State>,
    handler: Box<dyn EstimateHandler>,
    clock: Arc<dyn TimeSource>,
}

impl BandwidthController {
    /// Create a controller that reads time from a [`MonotonicClock`].
    pub fn new(
        peer: PeerId,
        config: Config,
        handler: impl EstimateHandler + 'static,
    ) -> Result<Self> {
        Self::with_clock(peer, config, handler, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        peer: PeerId,
        config: Config,
        handler: impl EstimateHandler + 'static,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;

        let now = clock.now_millis();
        let window =
            WindowAccumulator::new(config.slot_count, config.slot_duration_millis(), now)?;
        let policy = AimdPolicy::from_config(&config);
        let initial = policy.clamp(config.initial_bandwidth);

        debug!(
            "Peer #{}: controller created, initial estimate {} B/s, horizon {:?}",
            peer,
            config.initial_bandwidth,
            config.horizon()
        );

        Ok(Self {
            peer,
            policy,
            min_refresh_interval: config.min_refresh_interval_millis(),
            change_epsilon: config.change_epsilon,
            max_event_bytes: config.max_event_bytes,
            state: Mutex::new(State {
                window,
                current_estimate: initial,
                last_notified: initial,
                last_refresh_time: now,
                last_loss_ratio: None,
                last_throughput: None,
                refresh_count: 0,
            }),
            handler: Box::new(handler),
            clock,
        })
    }

    /// Tear the controller down. Equivalent to dropping it.
    pub fn destroy(self) {
        debug!("Peer #{}: controller destroyed", self.peer);
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Account for payload bytes the peer sent that never arrived.
    pub fn add_lost(&self, bytes: u32) -> Result<()> {
        self.check_bytes(bytes)?;
        let now = self.clock.now_millis();
        trace!("Peer #{}: {} bytes lost", self.peer, bytes);
        self.lock().window.record_lost(bytes, now);
        Ok(())
    }

    /// Account for payload bytes that arrived from the peer.
    pub fn add_recv(&self, bytes: u32) -> Result<()> {
        self.check_bytes(bytes)?;
        let now = self.clock.now_millis();
        trace!("Peer #{}: {} bytes received", self.peer, bytes);
        self.lock().window.record_recv(bytes, now);
        Ok(())
    }

    /// Current recommendation in bytes per second.
    pub fn estimate(&self) -> f32 {
        self.lock().current_estimate
    }

    pub fn stats(&self) -> Stats {
        let now = self.clock.now_millis();
        let mut state = self.lock();
        Stats {
            estimate: state.current_estimate,
            totals: state.window.totals(now),
            last_loss_ratio: state.last_loss_ratio,
            last_throughput: state.last_throughput,
            refresh_count: state.refresh_count,
        }
    }

    pub fn refresh(&self) -> RefreshOutcome {
        self.refresh_at(self.clock.now_millis())
    }

    /// Re-evaluate the estimate as of `now` and notify the handler if it changed.
    pub fn refresh_at(&self, now: u64) -> RefreshOutcome {
        let outcome = {
            let mut state = self.lock();

            let since_last = now.saturating_sub(state.last_refresh_time);
            if since_last < self.min_refresh_interval {
                trace!(
                    "Peer #{}: refresh skipped, {}ms since the last one",
                    self.peer,
                    since_last
                );
                return RefreshOutcome::RateLimited;
            }

            let loss = match estimator::estimate(&mut state.window, now) {
                Some(loss) => loss,
                None => {
                    trace!("Peer #{}: no traffic in window, keeping estimate", self.peer);
                    return RefreshOutcome::InsufficientData;
                }
            };

            let previous = state.current_estimate;
            let next = self.policy.next_estimate(previous, loss.loss_ratio);
            state.current_estimate = next;
            state.last_refresh_time = now;
            state.last_loss_ratio = Some(loss.loss_ratio);
            state.last_throughput = Some(loss.throughput);
            state.refresh_count += 1;

            debug!(
                "Peer #{}: loss {:.3}, throughput {:.0} B/s, estimate {:.0} -> {:.0} B/s",
                self.peer, loss.loss_ratio, loss.throughput, previous, next
            );

            // Compared against what the handler last saw, so slow drift still gets reported
            if (next - state.last_notified).abs() > self.change_epsilon {
                state.last_notified = next;
                RefreshOutcome::Changed(next)
            } else {
                RefreshOutcome::Unchanged(next)
            }
        };

        if let RefreshOutcome::Changed(bandwidth) = outcome {
            self.handler.on_estimate_changed(self, self.peer, bandwidth);
        }
        outcome
    }

    fn check_bytes(&self, bytes: u32) -> Result<()> {
        if bytes > self.max_event_bytes {
            warn!(
                "Peer #{}: rejecting byte count {} (limit {})",
                self.peer, bytes, self.max_event_bytes
            );
            return Err(Error::ByteCountTooLarge {
                bytes,
                limit: self.max_event_bytes,
            });
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock means a panic happened mid-update, so the window can't be trusted
        self.state
            .lock()
            .expect("bandwidth controller state lock poisoned")
    }
}

impl fmt::Debug for BandwidthController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BandwidthController")
            .field("peer", &self.peer)
            .field("policy", &self.policy)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish_non_exhaustive()
    }
}
