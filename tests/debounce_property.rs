use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;

use devloop::watch::DebounceWindow;

/// Drive the pure debounce core over a timeline of event offsets (ms from an
/// arbitrary origin, ascending) and return the trigger count.
///
/// Mirrors the async pump: at each event time the pending deadline is checked
/// first (the sleep wins a tie), then the event re-arms the window; after the
/// last event the pending window always elapses.
fn simulate(offsets: &[u64], window_ms: u64) -> usize {
    let start = Instant::now();
    let mut state = DebounceWindow::new(Duration::from_millis(window_ms));
    let mut triggers = 0;

    for &off in offsets {
        let now = start + Duration::from_millis(off);
        if state.fire_if_due(now) {
            triggers += 1;
        }
        state.observe(now);
    }
    if state.deadline().is_some() {
        triggers += 1;
    }
    triggers
}

/// Inter-arrival gaps to ascending offsets, first event at t=0.
fn offsets_from_gaps(gaps: &[u64]) -> Vec<u64> {
    let mut offsets = vec![0];
    let mut t = 0;
    for &gap in gaps {
        t += gap;
        offsets.push(t);
    }
    offsets
}

proptest! {
    /// One trigger per quiet period: a burst yields one trigger per gap of at
    /// least the window length, plus the final one after silence.
    #[test]
    fn one_trigger_per_quiet_period(
        gaps in proptest::collection::vec(0..1000u64, 0..20),
        window_ms in 1..500u64,
    ) {
        let offsets = offsets_from_gaps(&gaps);
        let expected = 1 + gaps.iter().filter(|&&gap| gap >= window_ms).count();
        prop_assert_eq!(simulate(&offsets, window_ms), expected);
    }

    /// Events all inside one window collapse to exactly one trigger.
    #[test]
    fn burst_within_window_collapses_to_one(
        gaps in proptest::collection::vec(0..300u64, 1..20),
    ) {
        let offsets = offsets_from_gaps(&gaps);
        prop_assert_eq!(simulate(&offsets, 300), 1);
    }

    /// Events spaced wider than the window each get their own trigger.
    #[test]
    fn spaced_events_trigger_individually(
        gaps in proptest::collection::vec(301..2000u64, 1..20),
    ) {
        let offsets = offsets_from_gaps(&gaps);
        prop_assert_eq!(simulate(&offsets, 300), offsets.len());
    }

    /// The pending trigger always fires exactly one window after the last
    /// event of a burst.
    #[test]
    fn trigger_fires_window_after_last_event(
        gaps in proptest::collection::vec(0..1000u64, 0..20),
        window_ms in 1..500u64,
    ) {
        let start = Instant::now();
        let window = Duration::from_millis(window_ms);
        let mut state = DebounceWindow::new(window);

        let offsets = offsets_from_gaps(&gaps);
        for &off in &offsets {
            let now = start + Duration::from_millis(off);
            state.fire_if_due(now);
            state.observe(now);
        }

        let last = start + Duration::from_millis(*offsets.last().unwrap());
        prop_assert_eq!(state.deadline(), Some(last + window));
    }
}

/// Save-all: three writes 50ms apart with a 300ms window produce a single
/// trigger, due 300ms after the third write.
#[test]
fn three_rapid_writes_fire_once() {
    let offsets = [0, 50, 100];
    assert_eq!(simulate(&offsets, 300), 1);

    let start = Instant::now();
    let mut state = DebounceWindow::new(Duration::from_millis(300));
    for &off in &offsets {
        state.observe(start + Duration::from_millis(off));
    }
    assert_eq!(
        state.deadline(),
        Some(start + Duration::from_millis(400))
    );
}
