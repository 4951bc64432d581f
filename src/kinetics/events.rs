use log::debug;
use serde::{Deserialize, Serialize};

use crate::trace_selection::tools::median;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Dwell,
    Wait,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Dwell, EventKind::Wait];

    fn index(&self) -> usize {
        match self {
            EventKind::Dwell => 0,
            EventKind::Wait => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Dwell => "dwell",
            EventKind::Wait => "wait",
        }
    }
}

/// Position of an interval relative to the observation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CensoringClass {
    // Already ongoing when the recording starts
    PreExisting,
    // Both boundaries observed
    Complete,
    // Still ongoing when the recording ends
    Ongoing,
}

impl CensoringClass {
    pub const ALL: [CensoringClass; 3] = [CensoringClass::PreExisting, CensoringClass::Complete, CensoringClass::Ongoing];

    pub fn number(&self) -> u8 {
        match self {
            CensoringClass::PreExisting => 1,
            CensoringClass::Complete => 2,
            CensoringClass::Ongoing => 3,
        }
    }

    fn index(&self) -> usize {
        self.number() as usize - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub censoring_class: CensoringClass,
    pub frames: usize,
}

impl Event {
    fn new(kind: EventKind, censoring_class: CensoringClass, frames: usize) -> Self {
        Self { kind, censoring_class, frames }
    }
}

// Kind of the interval that starts in the given state
fn kind_of_state(state: usize) -> EventKind {
    if state == 0 {EventKind::Wait} else {EventKind::Dwell}
}

/// Split a binary state sequence into censored dwell (bound) and wait
/// (unbound) intervals, measured in frames.
///
/// A transition is recorded at the earlier frame `i` of every pair where
/// `state[i] != state[i + 1]`. The interval before the first transition is
/// class 1, the one after the last transition class 3, and every interval
/// between consecutive transitions class 2.
pub fn extract_events(state_sequence: &[usize]) -> Vec<Event> {
    let n_frame = state_sequence.len();
    let transitions: Vec<usize> = state_sequence.windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] != pair[1])
        .map(|(i, _)| i)
        .collect();

    let (first, last) = match (transitions.first(), transitions.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Vec::new(),
    };

    let start_kind = kind_of_state(state_sequence[0]);
    let end_kind = kind_of_state(state_sequence[n_frame - 1]);

    let mut events = Vec::with_capacity(transitions.len() + 1);
    events.push(Event::new(start_kind, CensoringClass::PreExisting, first + 1));

    // Gaps alternate in kind, starting with the one that follows the first interval
    let mut gap_kind = opposite(start_kind);
    for pair in transitions.windows(2) {
        events.push(Event::new(gap_kind, CensoringClass::Complete, pair[1] - pair[0]));
        gap_kind = opposite(gap_kind);
    }

    events.push(Event::new(end_kind, CensoringClass::Ongoing, n_frame - last - 1));

    events
}

fn opposite(kind: EventKind) -> EventKind {
    match kind {
        EventKind::Dwell => EventKind::Wait,
        EventKind::Wait => EventKind::Dwell,
    }
}

/// Durations grouped by event kind and censoring class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPools {
    pools: [[Vec<f64>; 3]; 2],
}

impl EventPools {
    // Durations stay in frames until `exclude_short` converts them
    pub fn from_events<'a, I>(events: I) -> Self
    where I: IntoIterator<Item = &'a Event> {
        let mut pools = Self::default();
        for event in events {
            pools.pools[event.kind.index()][event.censoring_class.index()].push(event.frames as f64);
        }

        pools
    }

    pub fn get(&self, kind: EventKind, class: CensoringClass) -> &[f64] {
        &self.pools[kind.index()][class.index()]
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.pools[kind.index()].iter().map(|pool| pool.len()).sum()
    }

    // Remove the detection offset, drop non-positive durations, convert to seconds
    pub fn exclude_short(mut self, offset_frames: f64, time_interval: f64) -> Self {
        for pool in self.pools.iter_mut().flatten() {
            *pool = pool.iter()
                .map(|frames| frames - offset_frames)
                .filter(|&frames| frames > 0.0)
                .map(|frames| frames * time_interval)
                .collect();
        }

        self
    }

    // Drop durations at or above `factor` times the median of their pool
    pub fn exclude_long(mut self, factor: f64) -> Self {
        for kind in EventKind::ALL {
            for class in CensoringClass::ALL {
                let pool = &mut self.pools[kind.index()][class.index()];
                let cutoff = median(pool) * factor;
                let before = pool.len();
                pool.retain(|&duration| duration < cutoff);

                if pool.len() < before {
                    debug!("Dropped {} long {} events of class {}", before - pool.len(), kind.name(), class.number());
                }
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(events: &[Event]) -> Vec<(EventKind, u8, usize)> {
        events.iter().map(|event| (event.kind, event.censoring_class.number(), event.frames)).collect()
    }

    #[test]
    fn test_unbound_start_two_transitions() {
        let events = extract_events(&[0, 0, 1, 1, 0, 0]);
        assert_eq!(
            summary(&events),
            vec![(EventKind::Wait, 1, 2), (EventKind::Dwell, 2, 2), (EventKind::Wait, 3, 2)]
        );
    }

    #[test]
    fn test_bound_start_two_transitions() {
        let events = extract_events(&[1, 1, 0, 0, 1, 1]);
        assert_eq!(
            summary(&events),
            vec![(EventKind::Dwell, 1, 2), (EventKind::Wait, 2, 2), (EventKind::Dwell, 3, 2)]
        );
    }

    #[test]
    fn test_constant_sequence_has_no_events() {
        assert!(extract_events(&[0, 0, 0, 0]).is_empty());
        assert!(extract_events(&[1, 1, 1]).is_empty());
    }

    #[test]
    fn test_alternating_sequence() {
        let events = extract_events(&[1, 0, 1, 0]);
        assert_eq!(
            summary(&events),
            vec![(EventKind::Dwell, 1, 1), (EventKind::Wait, 2, 1), (EventKind::Dwell, 2, 1), (EventKind::Wait, 3, 1)]
        );
    }

    #[test]
    fn test_single_binding() {
        let events = extract_events(&[0, 0, 0, 1, 1]);
        assert_eq!(summary(&events), vec![(EventKind::Wait, 1, 3), (EventKind::Dwell, 3, 2)]);
    }

    #[test]
    fn test_single_unbinding() {
        let events = extract_events(&[1, 0, 0, 0, 0]);
        assert_eq!(summary(&events), vec![(EventKind::Dwell, 1, 1), (EventKind::Wait, 3, 4)]);
    }

    // Transition on the last frame pair gives a one-frame class 3 event
    #[test]
    fn test_boundary_transition() {
        let events = extract_events(&[0, 0, 0, 1]);
        assert_eq!(summary(&events), vec![(EventKind::Wait, 1, 3), (EventKind::Dwell, 3, 1)]);

        let pools = EventPools::from_events(&events).exclude_short(1.5, 0.1);
        assert!(pools.get(EventKind::Dwell, CensoringClass::Ongoing).is_empty());
        assert_eq!(pools.get(EventKind::Wait, CensoringClass::PreExisting).len(), 1);
    }

    // Frame totals of all events add back up to the trace length
    #[test]
    fn test_event_frames_cover_trace() {
        let sequence = [0, 1, 1, 0, 0, 0, 1, 0, 1, 1, 1];
        let total: usize = extract_events(&sequence).iter().map(|event| event.frames).sum();
        assert_eq!(total, sequence.len());
    }

    #[test]
    fn test_pool_filters() {
        let events: Vec<Event> = [1, 2, 3, 4, 100]
            .iter()
            .map(|&frames| Event::new(EventKind::Dwell, CensoringClass::Complete, frames))
            .collect();

        let pools = EventPools::from_events(&events).exclude_short(1.5, 2.0);
        assert_eq!(pools.get(EventKind::Dwell, CensoringClass::Complete), &[1.0, 3.0, 5.0, 197.0]);

        let pools = pools.exclude_long(10.0);
        assert_eq!(pools.get(EventKind::Dwell, CensoringClass::Complete), &[1.0, 3.0, 5.0]);
        assert_eq!(pools.count(EventKind::Dwell), 3);
        assert_eq!(pools.count(EventKind::Wait), 0);
    }
}
