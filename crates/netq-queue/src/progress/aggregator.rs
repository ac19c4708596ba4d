//! Aggregate byte-level progress across every operation of a run.
//!
//! The aggregator owns the four queue counters and decides when a fraction
//! may be forwarded to a sink. It has its own lock. The controller may call
//! into it while holding its own lock, never the other way round.
//!
//! Sinks are never called under either lock. A mutation decides on an
//! `Emission` while locked, and the emission is delivered after every guard
//! is released, so a sink may read the queue.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

use netq_core::{Direction, OperationId, ProgressSink};
use serde::Serialize;

use crate::lease::LeaseId;

/// Point-in-time copy of the queue's byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressTotals {
    /// Bytes uploaded so far.
    pub uploaded: u64,
    /// Known upload total.
    pub upload_total: u64,
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Known download total.
    pub download_total: u64,
}

impl ProgressTotals {
    /// Bytes moved so far in `direction`.
    #[must_use]
    pub const fn so_far(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Upload => self.uploaded,
            Direction::Download => self.downloaded,
        }
    }

    /// Known total in `direction`.
    #[must_use]
    pub const fn total(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Upload => self.upload_total,
            Direction::Download => self.download_total,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counter {
    so_far: u64,
    total: u64,
    last_emitted: Option<f64>,
}

impl Counter {
    #[allow(clippy::cast_precision_loss)]
    fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.so_far as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Per-operation bookkeeping.
#[derive(Debug, Default)]
struct OperationBytes {
    moved: [u64; 2],
    /// Total already fixed by a declared size or a probe.
    total_locked: [bool; 2],
    closed: bool,
}

struct AggregatorState {
    lease: LeaseId,
    counters: [Counter; 2],
    operations: HashMap<OperationId, OperationBytes>,
    download_gated: bool,
    sealed: bool,
    sinks: [Option<Weak<dyn ProgressSink>>; 2],
}

impl AggregatorState {
    fn accepts(&self, lease: LeaseId) -> bool {
        !self.sealed && self.lease == lease
    }

    /// Decide whether the fraction for `direction` should reach its sink.
    fn notify(&mut self, direction: Direction) -> Option<Emission> {
        if self.sealed || (direction == Direction::Download && self.download_gated) {
            return None;
        }
        let has_sink = self.sinks[direction.index()]
            .as_ref()
            .is_some_and(|sink| sink.strong_count() > 0);
        if !has_sink {
            return None;
        }

        let counter = &mut self.counters[direction.index()];
        if counter.so_far > counter.total {
            // Totals are still catching up.
            return None;
        }

        let fraction = counter.fraction();
        if counter.last_emitted.is_some_and(|last| fraction <= last) {
            return None;
        }
        counter.last_emitted = Some(fraction);

        Some(Emission {
            lease: self.lease,
            direction,
            fraction,
        })
    }

    fn clear_run(&mut self, lease: LeaseId) {
        self.lease = lease;
        self.counters = [Counter::default(); 2];
        self.operations.clear();
        self.download_gated = false;
    }
}

/// A fraction waiting to be handed to a sink once no lock is held.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Emission {
    lease: LeaseId,
    direction: Direction,
    fraction: f64,
}

/// Last fractions handed to sinks, per run.
#[derive(Debug)]
struct Delivered {
    lease: LeaseId,
    last: [Option<f64>; 2],
}

/// Thread-safe aggregate progress for one queue.
///
/// Fractions forwarded to sinks stay within `[0.0, 1.0]`, never regress
/// within a run, and stop entirely once the run has drained.
pub struct ProgressAggregator {
    state: Mutex<AggregatorState>,
    /// Serializes sink calls so concurrent deliveries cannot reorder.
    delivery: Mutex<Delivered>,
}

impl ProgressAggregator {
    pub(crate) fn new(lease: LeaseId) -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                lease,
                counters: [Counter::default(); 2],
                operations: HashMap::new(),
                download_gated: false,
                sealed: true,
                sinks: [None, None],
            }),
            delivery: Mutex::new(Delivered {
                lease,
                last: [None, None],
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current fraction complete in `direction`; `0.0` while the total is unknown.
    pub fn fraction(&self, direction: Direction) -> f64 {
        self.lock().counters[direction.index()].fraction()
    }

    /// Current byte counters.
    pub fn totals(&self) -> ProgressTotals {
        let state = self.lock();
        Self::totals_of(&state)
    }

    const fn totals_of(state: &AggregatorState) -> ProgressTotals {
        let upload = &state.counters[0];
        let download = &state.counters[1];
        ProgressTotals {
            uploaded: upload.so_far,
            upload_total: upload.total,
            downloaded: download.so_far,
            download_total: download.total,
        }
    }

    /// Bytes an operation moved as `(uploaded, downloaded)`.
    pub(crate) fn operation_bytes(&self, id: OperationId) -> (u64, u64) {
        self.lock()
            .operations
            .get(&id)
            .map_or((0, 0), |op| (op.moved[0], op.moved[1]))
    }

    pub(crate) fn set_sink(&self, direction: Direction, sink: Option<Weak<dyn ProgressSink>>) {
        self.lock().sinks[direction.index()] = sink;
    }

    pub(crate) fn sink(&self, direction: Direction) -> Option<Weak<dyn ProgressSink>> {
        self.lock().sinks[direction.index()].clone()
    }

    /// Discard everything, sinks included, and adopt `lease`.
    pub(crate) fn reset(&self, lease: LeaseId) {
        let mut state = self.lock();
        state.clear_run(lease);
        state.sealed = true;
        state.sinks = [None, None];
    }

    /// Zero the counters for a new run under `lease`.
    ///
    /// With `gate_downloads`, download fractions are held back until
    /// `open_download_gate`.
    pub(crate) fn begin_run(&self, lease: LeaseId, gate_downloads: bool) {
        let mut state = self.lock();
        state.clear_run(lease);
        state.download_gated = gate_downloads;
        state.sealed = false;
    }

    /// Count a size fixed ahead of the transfer (declared or probed).
    ///
    /// Later `add_to_total` calls for the same operation and direction are
    /// ignored so the bytes are not counted twice.
    ///
    /// Called under the controller lock, so the resulting emission is
    /// returned for the caller to `deliver` once that lock is released.
    #[must_use = "the emission must be delivered once the caller's lock is released"]
    pub(crate) fn lock_total(
        &self,
        lease: LeaseId,
        id: OperationId,
        direction: Direction,
        bytes: u64,
    ) -> Option<Emission> {
        let mut state = self.lock();
        if !state.accepts(lease) {
            return None;
        }

        let op = state.operations.entry(id).or_default();
        if op.closed || op.total_locked[direction.index()] {
            return None;
        }
        op.total_locked[direction.index()] = true;

        let counter = &mut state.counters[direction.index()];
        counter.total = counter.total.saturating_add(bytes);
        state.notify(direction)
    }

    pub(crate) fn add_to_total(
        &self,
        lease: LeaseId,
        id: OperationId,
        direction: Direction,
        bytes: u64,
    ) {
        let mut state = self.lock();
        if !state.accepts(lease) {
            return;
        }

        let op = state.operations.entry(id).or_default();
        if op.closed || op.total_locked[direction.index()] {
            return;
        }

        let counter = &mut state.counters[direction.index()];
        counter.total = counter.total.saturating_add(bytes);
        let emission = state.notify(direction);
        drop(state);

        if let Some(emission) = emission {
            self.deliver(emission);
        }
    }

    pub(crate) fn add_progress(
        &self,
        lease: LeaseId,
        id: OperationId,
        direction: Direction,
        bytes: u64,
    ) {
        let mut state = self.lock();
        if !state.accepts(lease) {
            return;
        }

        let op = state.operations.entry(id).or_default();
        if op.closed {
            return;
        }
        op.moved[direction.index()] = op.moved[direction.index()].saturating_add(bytes);

        let counter = &mut state.counters[direction.index()];
        counter.so_far = counter.so_far.saturating_add(bytes);
        let emission = state.notify(direction);
        drop(state);

        if let Some(emission) = emission {
            self.deliver(emission);
        }
    }

    /// Hand `emission` to its sink.
    ///
    /// Must be called with no queue lock held. Emissions of a sealed or
    /// abandoned run are dropped, as is any fraction that would regress
    /// below one already delivered.
    pub(crate) fn deliver(&self, emission: Emission) {
        let mut delivered = self
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let sink = {
            let state = self.lock();
            if state.sealed || state.lease != emission.lease {
                return;
            }
            state.sinks[emission.direction.index()]
                .as_ref()
                .and_then(Weak::upgrade)
        };
        let Some(sink) = sink else {
            return;
        };

        if delivered.lease != emission.lease {
            delivered.lease = emission.lease;
            delivered.last = [None, None];
        }
        let last = &mut delivered.last[emission.direction.index()];
        if last.is_some_and(|last| emission.fraction <= last) {
            return;
        }
        *last = Some(emission.fraction);

        match emission.direction {
            Direction::Upload => sink.on_upload_progress(emission.fraction),
            Direction::Download => sink.on_download_progress(emission.fraction),
        }
    }

    /// Stop accepting reports for a terminal operation.
    pub(crate) fn close(&self, lease: LeaseId, id: OperationId) {
        let mut state = self.lock();
        if state.lease == lease {
            state.operations.entry(id).or_default().closed = true;
        }
    }

    /// End the sizing phase. Nothing is emitted until the next mutation.
    pub(crate) fn open_download_gate(&self, lease: LeaseId) {
        let mut state = self.lock();
        if state.lease == lease {
            state.download_gated = false;
        }
    }

    /// Stop all emission for the run and return the final counters.
    pub(crate) fn seal(&self, lease: LeaseId) -> ProgressTotals {
        let mut state = self.lock();
        if state.lease == lease {
            state.sealed = true;
        }
        Self::totals_of(&state)
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("totals", &self.totals())
            .finish_non_exhaustive()
    }
}
