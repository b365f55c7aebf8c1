//! Producer and consumer halves of the trade ledger.
//!
//! `LedgerProducer` queues `Mutation`s under one lock and tracks the ids the
//! hub has seen, for the orphan watermark. `TradeLedger` drains the queue at
//! `start_iteration` and keeps the trades in insertion order.

use crate::mutation::{Mutation, TradeUpdate};
use hublink_core::{Trade, TradeId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct LedgerShared {
    pending: Mutex<Vec<Mutation>>,
    /// Highest trade id seen on the current or any previous connection.
    highest_id: AtomicU64,
    /// Trades at or below this id belong to a hub connection that is gone.
    watermark: Mutex<Option<TradeId>>,
}

/// Producer half, cloneable and usable from any thread.
#[derive(Debug, Clone)]
pub struct LedgerProducer {
    shared: Arc<LedgerShared>,
}

impl LedgerProducer {
    /// Queue a new trade and record its id.
    pub fn post_add(&self, trade: Trade) {
        self.observe_id(trade.id());
        self.shared.pending.lock().push(Mutation::Add(trade));
    }

    /// Queue a change to an existing trade. Unknown ids are skipped when
    /// the batch is applied.
    pub fn post_modify(&self, id: TradeId, update: TradeUpdate) {
        self.shared
            .pending
            .lock()
            .push(Mutation::Modify { id, update });
    }

    /// Mark every trade present when the batch is applied as wanting close.
    pub fn post_close_all(&self) {
        self.shared.pending.lock().push(Mutation::CloseAll);
    }

    /// Record an id handed out to or announced by the hub.
    pub fn observe_id(&self, id: TradeId) {
        self.shared.highest_id.fetch_max(id, Ordering::AcqRel);
    }

    /// Highest id recorded so far, 0 if none.
    pub fn highest_id(&self) -> TradeId {
        self.shared.highest_id.load(Ordering::Acquire)
    }

    /// The hub connection is gone: orphan every trade known so far and ask
    /// for all of them to be closed.
    pub fn mark_orphaned(&self) {
        let highest = self.highest_id();
        {
            let mut watermark = self.shared.watermark.lock();
            let raised = watermark.map_or(highest, |current| current.max(highest));
            *watermark = Some(raised);
        }
        info!(watermark = highest, "Trades orphaned by disconnect");
        self.post_close_all();
    }

    /// Highest id known at the last disconnect.
    pub fn watermark(&self) -> Option<TradeId> {
        *self.shared.watermark.lock()
    }

    /// Whether lifecycle notifications for `id` must be suppressed.
    pub fn is_orphaned(&self, id: TradeId) -> bool {
        self.watermark().is_some_and(|watermark| id <= watermark)
    }

    /// Number of mutations waiting for the next iteration.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

/// Consumer half, owned by the trading engine thread.
///
/// Trades iterate in insertion order. Between `start_iteration` calls the
/// engine sees a stable set, changed only by its own `remove` calls.
#[derive(Debug)]
pub struct TradeLedger {
    shared: Arc<LedgerShared>,
    trades: IndexMap<TradeId, Trade>,
    iteration: VecDeque<TradeId>,
    current: Option<TradeId>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LedgerShared::default()),
            trades: IndexMap::new(),
            iteration: VecDeque::new(),
            current: None,
        }
    }

    /// A producer feeding this ledger.
    pub fn producer(&self) -> LedgerProducer {
        LedgerProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Apply every queued mutation in enqueue order. Returns how many ran.
    pub fn apply_modifications(&mut self) -> usize {
        let mut pending = self.shared.pending.lock();
        let applied = pending.len();

        for mutation in pending.drain(..) {
            match mutation {
                Mutation::Add(trade) => {
                    let id = trade.id();
                    if self.trades.contains_key(&id) {
                        warn!(trade_id = id, "Ignoring duplicate trade id");
                    } else {
                        self.trades.insert(id, trade);
                    }
                }
                Mutation::Modify { id, update } => match self.trades.get_mut(&id) {
                    Some(trade) => update.apply(trade),
                    None => debug!(trade_id = id, ?update, "Modification for unknown trade"),
                },
                Mutation::CloseAll => {
                    for trade in self.trades.values_mut() {
                        trade.mark_wants_close();
                    }
                }
            }
        }

        applied
    }

    /// Apply queued mutations and snapshot the id order to walk.
    pub fn start_iteration(&mut self) {
        self.apply_modifications();
        self.iteration = self.trades.keys().copied().collect();
        self.current = None;
    }

    /// Advance to the next trade of the snapshot. Ids removed since the
    /// snapshot are skipped. Returns `false` once the snapshot is used up.
    pub fn shift_to_next(&mut self) -> bool {
        while let Some(id) = self.iteration.pop_front() {
            if self.trades.contains_key(&id) {
                self.current = Some(id);
                return true;
            }
        }
        self.current = None;
        false
    }

    /// Trade selected by the last `shift_to_next`.
    pub fn current(&self) -> Option<&Trade> {
        self.current.and_then(|id| self.trades.get(&id))
    }

    pub fn current_mut(&mut self) -> Option<&mut Trade> {
        let id = self.current?;
        self.trades.get_mut(&id)
    }

    pub fn current_id(&self) -> Option<TradeId> {
        self.current().map(Trade::id)
    }

    pub fn trade(&self, id: TradeId) -> Option<&Trade> {
        self.trades.get(&id)
    }

    pub fn trade_mut(&mut self, id: TradeId) -> Option<&mut Trade> {
        self.trades.get_mut(&id)
    }

    /// Remove a trade immediately, keeping the order of the others.
    pub fn remove(&mut self, id: TradeId) -> Option<Trade> {
        if self.current == Some(id) {
            self.current = None;
        }
        self.trades.shift_remove(&id)
    }

    pub fn ids(&self) -> Vec<TradeId> {
        self.trades.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new()
    }
}
