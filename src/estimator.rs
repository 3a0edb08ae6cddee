use crate::window::{Totals, WindowAccumulator};

/// Loss and throughput observed over one window horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossEstimate {
    /// Fraction of accounted bytes that were lost, in [0, 1]
    pub loss_ratio: f32,
    /// Received bytes per second over the horizon
    pub throughput: f32,
}

/// Read the window at `now`. Returns `None` when nothing was lost or received within the
/// horizon, since a zero ratio computed from no traffic says nothing about the link.
pub fn estimate(window: &mut WindowAccumulator, now: u64) -> Option<LossEstimate> {
    let totals = window.totals(now);
    from_totals(&totals, window.horizon_millis())
}

pub(crate) fn from_totals(totals: &Totals, horizon_millis: u64) -> Option<LossEstimate> {
    if totals.is_empty() {
        return None;
    }

    let accounted = (totals.lost_bytes + totals.recv_bytes).max(1);
    let loss_ratio = (totals.lost_bytes as f64 / accounted as f64).clamp(0.0, 1.0) as f32;

    let horizon_secs = horizon_millis.max(1) as f64 / 1000.0;
    let throughput = (totals.recv_bytes as f64 / horizon_secs) as f32;

    Some(LossEstimate {
        loss_ratio,
        throughput,
    })
}
