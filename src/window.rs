use log::trace;

use crate::error::*;

/// Byte counters for one slot of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounters {
    pub sent_bytes: u64,
    pub lost_bytes: u64,
    pub recv_bytes: u64,
}

/// Sums of every live slot in the window.
pub type Totals = SlotCounters;

impl SlotCounters {
    pub fn is_empty(&self) -> bool {
        self.lost_bytes == 0 && self.recv_bytes == 0
    }

    fn add(&mut self, other: &SlotCounters) {
        self.sent_bytes += other.sent_bytes;
        self.lost_bytes += other.lost_bytes;
        self.recv_bytes += other.recv_bytes;
    }
}

/// Ring of fixed-duration slots covering the last `slot_count * slot_duration` milliseconds.
///
/// Every byte reported as lost or received also counts as sent, since it was traffic that
/// existed on the wire. This keeps the lost total bounded by the sent total.
#[derive(Debug)]
pub struct WindowAccumulator {
    slots: Vec<SlotCounters>,
    slot_duration: u64,
    /// Slot that absorbs events happening "now"
    head_index: usize,
    /// Start time of the head slot
    head_time: u64,
}

impl WindowAccumulator {
    /// Allocate a zeroed window whose head slot starts at `now`.
    pub fn new(slot_count: usize, slot_duration: u64, now: u64) -> Result<Self> {
        if slot_count == 0 {
            return Err(Error::InvalidConfig("slot count must be non-zero"));
        }
        if slot_duration == 0 {
            return Err(Error::InvalidConfig("slot duration must be at least 1ms"));
        }
        if slot_duration.checked_mul(slot_count as u64).is_none() {
            return Err(Error::InvalidConfig(
                "window horizon does not fit in u64 milliseconds",
            ));
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(slot_count)?;
        slots.resize(slot_count, SlotCounters::default());

        Ok(Self {
            slots,
            slot_duration,
            head_index: 0,
            head_time: now,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn horizon_millis(&self) -> u64 {
        self.slot_duration * self.slots.len() as u64
    }

    /// Bytes put on the wire that weren't individually accounted as lost or received.
    pub fn record_sent(&mut self, bytes: u32, now: u64) {
        self.rotate(now);
        self.head_mut().sent_bytes += u64::from(bytes);
    }

    pub fn record_lost(&mut self, bytes: u32, now: u64) {
        self.rotate(now);
        let head = self.head_mut();
        head.sent_bytes += u64::from(bytes);
        head.lost_bytes += u64::from(bytes);
    }

    pub fn record_recv(&mut self, bytes: u32, now: u64) {
        self.rotate(now);
        let head = self.head_mut();
        head.sent_bytes += u64::from(bytes);
        head.recv_bytes += u64::from(bytes);
    }

    pub fn totals(&mut self, now: u64) -> Totals {
        self.rotate(now);
        let mut totals = Totals::default();
        for slot in &self.slots {
            totals.add(slot);
        }
        debug_assert!(totals.lost_bytes <= totals.sent_bytes);
        totals
    }

    /// Bring the head slot up to `now`, zeroing every slot that fell out of the horizon.
    ///
    /// A `now` older than the head slot's start is treated as landing in the head slot; callers
    /// racing on the lock may observe slightly stale timestamps.
    fn rotate(&mut self, now: u64) {
        let elapsed_slots = now.saturating_sub(self.head_time) / self.slot_duration;
        if elapsed_slots == 0 {
            return;
        }

        let slot_count = self.slots.len();
        if elapsed_slots >= slot_count as u64 {
            trace!(
                "window stale for {} slots, clearing all {}",
                elapsed_slots,
                slot_count
            );
            self.slots.fill(SlotCounters::default());
            self.head_time = now;
            return;
        }

        for _ in 0..elapsed_slots {
            self.head_index = (self.head_index + 1) % slot_count;
            self.slots[self.head_index] = SlotCounters::default();
        }
        self.head_time += elapsed_slots * self.slot_duration;
    }

    fn head_mut(&mut self) -> &mut SlotCounters {
        &mut self.slots[self.head_index]
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn window() -> WindowAccumulator {
        WindowAccumulator::new(4, 500, 0).unwrap()
    }

    #[test]
    fn new_rejects_empty_window_test() {
        assert!(WindowAccumulator::new(0, 500, 0).is_err());
        assert!(WindowAccumulator::new(4, 0, 0).is_err());
        assert!(WindowAccumulator::new(4, u64::MAX / 2, 0).is_err());
        assert_eq!(window().horizon_millis(), 2000);
    }

    #[test]
    fn record_and_totals_test() {
        let mut window = window();
        window.record_recv(1000, 0);
        window.record_lost(100, 10);
        window.record_sent(50, 20);

        let totals = window.totals(30);
        assert_eq!(totals.recv_bytes, 1000);
        assert_eq!(totals.lost_bytes, 100);
        assert_eq!(totals.sent_bytes, 1150);
    }

    #[test]
    fn zero_bytes_still_rotates_test() {
        let mut window = window();
        window.record_recv(1000, 0);
        // Entire window is stale at 2000ms, recording nothing must still clear it
        window.record_recv(0, 2000);
        assert_eq!(window.totals(2000), Totals::default());
    }

    #[test]
    fn rotation_drops_old_slots_test() {
        let mut window = window();
        for slot in 0..4 {
            window.record_recv(1000, slot * 500);
        }
        assert_eq!(window.totals(1999).recv_bytes, 4000);

        // One slot rotates out
        assert_eq!(window.totals(2000).recv_bytes, 3000);
        // Two more
        assert_eq!(window.totals(3000).recv_bytes, 1000);
        // Everything
        assert_eq!(window.totals(10_000).recv_bytes, 0);
    }

    #[test]
    fn full_clear_resets_head_time_test() {
        let mut window = window();
        window.record_recv(1000, 0);
        window.record_recv(500, 5250);
        // Head slot now starts at 5250, so this lands in the same slot
        window.record_recv(500, 5700);
        assert_eq!(window.totals(5749).recv_bytes, 1000);
        assert_eq!(window.totals(5750).recv_bytes, 1000);
        assert_eq!(window.totals(7250).recv_bytes, 0);
    }

    #[test]
    fn stale_timestamp_lands_in_head_test() {
        let mut window = window();
        window.record_recv(1000, 1000);
        window.record_recv(1000, 400);
        assert_eq!(window.totals(1000).recv_bytes, 2000);
    }

    #[test]
    fn idempotent_rotation_test() {
        let mut window = window();
        window.record_recv(300, 100);
        window.record_lost(30, 700);
        window.record_recv(300, 1600);

        let first = window.totals(2300);
        let second = window.totals(2300);
        assert_eq!(first, second);
        assert_eq!(first.recv_bytes, 300);
        assert_eq!(first.lost_bytes, 30);
    }

    #[test]
    fn never_reads_beyond_horizon_test() {
        let mut rng = rand::thread_rng();
        let mut window = window();
        let mut events: Vec<(u64, u32)> = Vec::new();
        let mut now = 0;

        for _ in 0..2000 {
            now += rng.gen_range(0..400);
            let bytes = rng.gen_range(0..5000);
            window.record_recv(bytes, now);
            events.push((now, bytes));

            let totals = window.totals(now);
            // Events in the same slot as `now - horizon` can still be live, anything strictly
            // older than one full horizon must be gone
            let oldest_possible = now.saturating_sub(window.horizon_millis());
            let upper_bound: u64 = events
                .iter()
                .filter(|(at, _)| *at >= oldest_possible)
                .map(|(_, bytes)| u64::from(*bytes))
                .sum();
            assert!(totals.recv_bytes <= upper_bound);
            assert!(totals.lost_bytes <= totals.sent_bytes);
        }
    }
}
