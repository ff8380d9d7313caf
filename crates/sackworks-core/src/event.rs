//! Simulation events for UI, audio, and analytics.
//!
//! Machines emit [`SimEvent`]s while a step runs; the bus buffers them per
//! kind in bounded ring buffers and hands them to listeners at the end of the
//! step. Listeners are read-only: nothing delivered here can change the
//! simulation or the tracker.
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which skips
//! buffering for that kind entirely.

use std::collections::VecDeque;

use crate::fixed::Ticks;
use crate::geometry::Direction;
use crate::id::{BallId, ColorId, ComponentId};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    BallSpawned {
        ball: BallId,
        component: ComponentId,
        tick: Ticks,
    },
    BallObserved {
        ball: BallId,
        color: ColorId,
        component: ComponentId,
        tick: Ticks,
    },
    BallDuplicated {
        original: BallId,
        copy: BallId,
        component: ComponentId,
        tick: Ticks,
    },
    ShufflerCycle {
        component: ComponentId,
        shuffled: u32,
        retained: u32,
        tick: Ticks,
    },
    BallCollected {
        ball: BallId,
        component: ComponentId,
        tick: Ticks,
    },
    /// A shuffler gave up waiting and removed a held ball.
    BallForceCollected {
        ball: BallId,
        component: ComponentId,
        tick: Ticks,
    },
    /// A ball left through a port whose neighbor was removed.
    BallDropped {
        ball: BallId,
        component: ComponentId,
        side: Direction,
        tick: Ticks,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BallSpawned,
    BallObserved,
    BallDuplicated,
    ShufflerCycle,
    BallCollected,
    BallForceCollected,
    BallDropped,
}

const EVENT_KIND_COUNT: usize = 7;

impl SimEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SimEvent::BallSpawned { .. } => EventKind::BallSpawned,
            SimEvent::BallObserved { .. } => EventKind::BallObserved,
            SimEvent::BallDuplicated { .. } => EventKind::BallDuplicated,
            SimEvent::ShufflerCycle { .. } => EventKind::ShufflerCycle,
            SimEvent::BallCollected { .. } => EventKind::BallCollected,
            SimEvent::BallForceCollected { .. } => EventKind::BallForceCollected,
            SimEvent::BallDropped { .. } => EventKind::BallDropped,
        }
    }

    pub fn tick(&self) -> Ticks {
        match *self {
            SimEvent::BallSpawned { tick, .. }
            | SimEvent::BallObserved { tick, .. }
            | SimEvent::BallDuplicated { tick, .. }
            | SimEvent::ShufflerCycle { tick, .. }
            | SimEvent::BallCollected { tick, .. }
            | SimEvent::BallForceCollected { tick, .. }
            | SimEvent::BallDropped { tick, .. } => tick,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

/// Bounded FIFO of events. When full, the oldest event is dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<SimEvent>,
    capacity: usize,
    total_written: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    pub fn push(&mut self, event: SimEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events lost to overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity as u64)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &SimEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

pub type Listener = Box<dyn FnMut(&SimEvent)>;

pub type EventFilter = Box<dyn Fn(&SimEvent) -> bool>;

/// Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct ListenerEntry {
    listener: Listener,
    priority: ListenerPriority,
    filter: Option<EventFilter>,
    order: u64,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    default_capacity: usize,
    next_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Default::default(),
            default_capacity,
            next_order: 0,
        }
    }

    /// Stop buffering an event kind and drop anything already buffered.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    pub fn emit(&mut self, event: SimEvent) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    pub fn on(&mut self, kind: EventKind, listener: Listener) {
        self.on_filtered(kind, ListenerPriority::Normal, None, listener);
    }

    pub fn on_filtered(
        &mut self,
        kind: EventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) {
        let order = self.next_order;
        self.next_order += 1;
        let list = &mut self.listeners[kind.index()];
        list.push(ListenerEntry {
            listener,
            priority,
            filter,
            order,
        });
        list.sort_by_key(|e| (e.priority, e.order));
    }

    /// Hand every buffered event to its listeners, then clear the buffers.
    ///
    /// A kind with no listeners keeps its buffer so callers can read it via
    /// [`EventBus::buffer`] after the step.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            if self.listeners[idx].is_empty() {
                continue;
            }
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            for event in buffer.iter() {
                for entry in &mut self.listeners[idx] {
                    if entry.filter.as_ref().is_some_and(|f| !f(event)) {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
            buffer.clear();
        }
    }

    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffer(kind).map_or(0, EventBuffer::len)
    }

    /// Events ever emitted for a kind, including dropped ones.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffer(kind).map_or(0, EventBuffer::total_written)
    }

    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn component() -> ComponentId {
        let mut sm = SlotMap::<ComponentId, ()>::with_key();
        sm.insert(())
    }

    fn spawned(ball: u64, tick: Ticks) -> SimEvent {
        SimEvent::BallSpawned {
            ball: BallId(ball),
            component: component(),
            tick,
        }
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let mut buf = EventBuffer::new(3);
        for i in 0..5 {
            buf.push(spawned(i, i));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.total_written(), 5);
        assert_eq!(buf.dropped_count(), 2);
        let ticks: Vec<Ticks> = buf.iter().map(SimEvent::tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buf = EventBuffer::new(0);
        buf.push(spawned(0, 0));
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn suppressed_kind_is_not_buffered() {
        let mut bus = EventBus::new(8);
        bus.emit(spawned(0, 0));
        bus.suppress(EventKind::BallSpawned);
        bus.emit(spawned(1, 1));
        assert!(bus.is_suppressed(EventKind::BallSpawned));
        assert!(bus.buffer(EventKind::BallSpawned).is_none());
        assert_eq!(bus.total_emitted(EventKind::BallSpawned), 0);
    }

    #[test]
    fn listeners_run_by_priority_then_registration() {
        let mut bus = EventBus::new(8);
        let log = Rc::new(RefCell::new(Vec::new()));
        for (name, priority) in [
            ("normal_a", ListenerPriority::Normal),
            ("post", ListenerPriority::Post),
            ("pre", ListenerPriority::Pre),
            ("normal_b", ListenerPriority::Normal),
        ] {
            let log = Rc::clone(&log);
            bus.on_filtered(
                EventKind::BallSpawned,
                priority,
                None,
                Box::new(move |_| log.borrow_mut().push(name)),
            );
        }
        bus.emit(spawned(0, 0));
        bus.deliver();
        assert_eq!(*log.borrow(), vec!["pre", "normal_a", "normal_b", "post"]);
        assert_eq!(bus.buffered_count(EventKind::BallSpawned), 0);
    }

    #[test]
    fn filter_skips_non_matching() {
        let mut bus = EventBus::new(8);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.on_filtered(
            EventKind::BallSpawned,
            ListenerPriority::Normal,
            Some(Box::new(|e| e.tick() % 2 == 0)),
            Box::new(move |e| sink.borrow_mut().push(e.tick())),
        );
        for t in 0..5 {
            bus.emit(spawned(t, t));
        }
        bus.deliver();
        assert_eq!(*seen.borrow(), vec![0, 2, 4]);
    }

    #[test]
    fn unlistened_kinds_stay_buffered() {
        let mut bus = EventBus::new(8);
        bus.emit(spawned(0, 0));
        bus.deliver();
        assert_eq!(bus.buffered_count(EventKind::BallSpawned), 1);
        bus.clear_all();
        assert_eq!(bus.buffered_count(EventKind::BallSpawned), 0);
    }

    #[test]
    fn kinds_are_independent() {
        let mut bus = EventBus::new(8);
        bus.emit(spawned(0, 0));
        bus.emit(SimEvent::BallCollected {
            ball: BallId(0),
            component: component(),
            tick: 3,
        });
        assert_eq!(bus.buffered_count(EventKind::BallSpawned), 1);
        assert_eq!(bus.buffered_count(EventKind::BallCollected), 1);
        assert_eq!(bus.buffered_count(EventKind::BallDropped), 0);
    }
}
