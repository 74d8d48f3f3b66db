use std::collections::VecDeque;

use crate::ids::ChangeEvent;

/// Pending change events of one dispatch.
///
/// Follow-ups are pushed to the front in emission order, so the queue drains
/// depth-first: an event's own consequences complete before its siblings run.
#[derive(Debug, Default)]
pub struct EventRelay {
    pending: VecDeque<ChangeEvent>,
    draining: bool,
    handled: usize,
}

impl EventRelay {
    /// Queues an external event. Returns false when a drain is already in
    /// progress; the event then runs as part of that drain.
    pub fn push(&mut self, event: ChangeEvent) -> bool {
        self.pending.push_back(event);
        !self.draining
    }

    pub fn push_follow_ups(&mut self, events: Vec<ChangeEvent>) {
        for event in events.into_iter().rev() {
            self.pending.push_front(event);
        }
    }

    pub fn begin(&mut self) {
        self.draining = true;
        self.handled = 0;
    }

    /// Next event to handle, or `None` once the queue is empty or `limit` events were handled.
    pub fn next(&mut self, limit: usize) -> Option<ChangeEvent> {
        if self.handled >= limit {
            return None;
        }
        let event = self.pending.pop_front()?;
        self.handled += 1;
        Some(event)
    }

    /// Ends the drain and returns how many events were left unhandled; they are dropped.
    pub fn finish(&mut self) -> usize {
        self.draining = false;
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{InputRef, OptionId};

    fn event(id: u32) -> ChangeEvent {
        ChangeEvent::synthetic(InputRef::Option(OptionId(id)))
    }

    #[test]
    fn follow_ups_run_before_queued_siblings() {
        let mut relay = EventRelay::default();
        assert!(relay.push(event(1)));
        relay.push(event(2));
        relay.begin();
        assert_eq!(relay.next(10), Some(event(1)));
        relay.push_follow_ups(vec![event(3), event(4)]);
        assert_eq!(relay.next(10), Some(event(3)));
        relay.push_follow_ups(vec![event(5)]);
        assert_eq!(relay.next(10), Some(event(5)));
        assert_eq!(relay.next(10), Some(event(4)));
        assert_eq!(relay.next(10), Some(event(2)));
        assert_eq!(relay.next(10), None);
        assert_eq!(relay.finish(), 0);
    }

    #[test]
    fn pushes_during_drain_are_queued() {
        let mut relay = EventRelay::default();
        relay.begin();
        assert!(!relay.push(event(1)));
        assert_eq!(relay.next(10), Some(event(1)));
        relay.finish();
        assert!(relay.push(event(2)));
    }

    #[test]
    fn limit_stops_drain() {
        let mut relay = EventRelay::default();
        relay.push(event(1));
        relay.push(event(2));
        relay.begin();
        assert!(relay.next(1).is_some());
        assert_eq!(relay.next(1), None);
        assert_eq!(relay.finish(), 1);
    }
}
