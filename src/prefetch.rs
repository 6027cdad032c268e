use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::Catalog;
use crate::decoder::{Decode, DecodeError, DisplayBuffer, ViewportSize};

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Prev,
    Next,
}

impl Side {
    /// The index this side wants for a given current index, if in range.
    pub fn neighbor(self, current: usize, len: usize) -> Option<usize> {
        match self {
            Side::Prev => current.checked_sub(1),
            Side::Next => current.checked_add(1).filter(|&i| i < len),
        }
    }
}

/// What a slot holds. A buffer can only exist together with the index and
/// viewport it was decoded for.
#[derive(Debug)]
pub enum SlotState {
    Empty,
    Pending {
        target: usize,
        viewport: ViewportSize,
    },
    Ready {
        target: usize,
        viewport: ViewportSize,
        buffer: DisplayBuffer,
    },
}

#[derive(Debug)]
pub struct PrefetchSlot {
    state: SlotState,
    generation: u64,
}

impl PrefetchSlot {
    fn new() -> Self {
        Self {
            state: SlotState::Empty,
            generation: 0,
        }
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> Option<usize> {
        match self.state {
            SlotState::Empty => None,
            SlotState::Pending { target, .. } | SlotState::Ready { target, .. } => Some(target),
        }
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SlotState::Ready { .. })
    }

    /// True if the slot holds, or is waiting for, exactly this request.
    fn covers(&self, wanted: usize, wanted_viewport: ViewportSize) -> bool {
        match self.state {
            SlotState::Empty => false,
            SlotState::Pending { target, viewport } | SlotState::Ready { target, viewport, .. } => {
                target == wanted && viewport == wanted_viewport
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Completion messages (worker -> controller)
// ---------------------------------------------------------------------------

pub struct Completion {
    pub side: Side,
    pub generation: u64,
    pub target: usize,
    pub result: Result<DisplayBuffer, DecodeError>,
}

/// Called by a worker after its completion has been queued.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// The two speculative neighbor slots around the current image.
///
/// Only the owning (controller) thread touches the slots. Workers decode and
/// hand their result back through the channel; every result carries the
/// generation it was issued under and is dropped if the slot has moved on.
pub struct PrefetchCache<D: Decode> {
    catalog: Arc<Catalog>,
    decoder: Arc<D>,
    prev: PrefetchSlot,
    next: PrefetchSlot,
    next_generation: u64,
    in_flight: usize,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    waker: Option<Waker>,
}

impl<D: Decode> PrefetchCache<D> {
    pub fn new(catalog: Arc<Catalog>, decoder: Arc<D>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            catalog,
            decoder,
            prev: PrefetchSlot::new(),
            next: PrefetchSlot::new(),
            next_generation: 0,
            in_flight: 0,
            tx,
            rx,
            waker: None,
        }
    }

    pub fn set_waker(&mut self, waker: Waker) {
        self.waker = Some(waker);
    }

    pub fn slot(&self, side: Side) -> &PrefetchSlot {
        match side {
            Side::Prev => &self.prev,
            Side::Next => &self.next,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut PrefetchSlot {
        match side {
            Side::Prev => &mut self.prev,
            Side::Next => &mut self.next,
        }
    }

    /// Number of dispatched jobs whose completion has not been received yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn fresh_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Make both neighbor slots hold or await the images adjacent to `current`.
    pub fn ensure_window(&mut self, current: usize, viewport: ViewportSize) {
        let len = self.catalog.len();
        for side in [Side::Prev, Side::Next] {
            match side.neighbor(current, len) {
                Some(target) => {
                    if !self.slot(side).covers(target, viewport) {
                        self.dispatch(side, target, viewport);
                    }
                }
                None => self.clear(side),
            }
        }
    }

    fn clear(&mut self, side: Side) {
        let generation = self.fresh_generation();
        let slot = self.slot_mut(side);
        slot.state = SlotState::Empty;
        slot.generation = generation;
    }

    fn dispatch(&mut self, side: Side, target: usize, viewport: ViewportSize) {
        let Some(image) = self.catalog.get(target).cloned() else {
            self.clear(side);
            return;
        };

        let previous = self.slot(side).target();
        let generation = self.fresh_generation();
        let slot = self.slot_mut(side);
        slot.state = SlotState::Pending { target, viewport };
        slot.generation = generation;
        self.in_flight += 1;

        log::debug!(
            "[prefetch] dispatch {:?} idx={} gen={} {}x{} (was {:?})",
            side,
            target,
            generation,
            viewport.width,
            viewport.height,
            previous
        );

        let decoder = Arc::clone(&self.decoder);
        let tx = self.tx.clone();
        let waker = self.waker.clone();
        rayon::spawn(move || {
            let result = decoder.decode(&image, viewport);
            let completion = Completion {
                side,
                generation,
                target,
                result,
            };
            // The controller may already be gone; nothing left to deliver to.
            if tx.send(completion).is_ok() {
                if let Some(waker) = waker {
                    waker();
                }
            }
        });
    }

    /// Apply one worker result. Returns true if it was stored into its slot.
    pub fn on_job_complete(&mut self, completion: Completion) -> bool {
        let Completion {
            side,
            generation,
            target,
            result,
        } = completion;
        let slot = self.slot_mut(side);

        let wanted = match slot.state {
            SlotState::Pending { target: t, viewport } if slot.generation == generation && t == target => viewport,
            _ => {
                log::debug!(
                    "[prefetch] discard stale {:?} idx={} gen={} (slot gen={})",
                    side,
                    target,
                    generation,
                    slot.generation
                );
                return false;
            }
        };

        match result {
            Ok(buffer) => {
                log::debug!("[prefetch] ready {:?} idx={} gen={}", side, target, generation);
                slot.state = SlotState::Ready {
                    target,
                    viewport: wanted,
                    buffer,
                };
                true
            }
            Err(e) => {
                log::warn!("Prefetch of image {} failed: {}", target + 1, e);
                slot.state = SlotState::Empty;
                false
            }
        }
    }

    /// Apply every completion queued so far without blocking.
    pub fn drain(&mut self) -> usize {
        let mut accepted = 0;
        while let Ok(completion) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            if self.on_job_complete(completion) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Block until every dispatched job has reported back, or `timeout` passes.
    /// Returns true if nothing is left in flight.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(completion) => {
                    self.in_flight -= 1;
                    self.on_job_complete(completion);
                }
                Err(_) => return false,
            }
        }
        true
    }

    /// Hand over the slot's buffer if it was decoded for `wanted`.
    pub fn take_if_matches(&mut self, side: Side, wanted: usize) -> Option<DisplayBuffer> {
        let slot = self.slot_mut(side);
        match slot.state {
            SlotState::Ready { target, .. } if target == wanted => {}
            _ => return None,
        }
        match std::mem::replace(&mut slot.state, SlotState::Empty) {
            SlotState::Ready { buffer, .. } => Some(buffer),
            _ => None,
        }
    }

    /// Drop both slots and retire every in-flight job. Used on viewport change.
    pub fn invalidate_all(&mut self) {
        self.clear(Side::Prev);
        self.clear(Side::Next);
    }
}
