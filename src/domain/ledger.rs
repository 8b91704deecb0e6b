//! Position ledger: the single owned store of tracked positions.
//!
//! Every mutation goes through a method here and bumps `revision` when it
//! actually changes something, which is how callers know to persist.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::position::{Position, PositionState};
use super::signal::SignalStrength;

/// An entry order the broker accepted but has not confirmed as filled.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub symbol: String,
    pub quantity: i64,
    pub reference_price: f64,
    pub strength: SignalStrength,
    pub submitted_at: DateTime<Utc>,
    pub cycles_waiting: u32,
}

impl PendingEntry {
    pub fn committed_capital(&self) -> f64 {
        self.quantity as f64 * self.reference_price
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionLedger {
    positions: BTreeMap<String, Position>,
    pending_entries: BTreeMap<String, PendingEntry>,
    revision: u64,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts. The revision starts at zero.
    pub fn from_parts(positions: Vec<Position>, pending: Vec<PendingEntry>) -> Self {
        PositionLedger {
            positions: positions
                .into_iter()
                .map(|p| (p.symbol.clone(), p))
                .collect(),
            pending_entries: pending
                .into_iter()
                .map(|e| (e.symbol.clone(), e))
                .collect(),
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.pending_entries.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.positions
            .keys()
            .chain(self.pending_entries.keys())
            .map(String::as_str)
    }

    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
        self.revision += 1;
    }

    pub fn remove(&mut self, symbol: &str) -> Option<Position> {
        let removed = self.positions.remove(symbol);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    /// Mutate one position in place. The revision moves only if the position
    /// compares different afterwards.
    pub fn update<F, R>(&mut self, symbol: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Position) -> R,
    {
        let position = self.positions.get_mut(symbol)?;
        let before = position.clone();
        let result = f(position);
        if *position != before {
            self.revision += 1;
        }
        Some(result)
    }

    pub fn pending_entry(&self, symbol: &str) -> Option<&PendingEntry> {
        self.pending_entries.get(symbol)
    }

    pub fn pending_entries(&self) -> impl Iterator<Item = &PendingEntry> {
        self.pending_entries.values()
    }

    pub fn add_pending_entry(&mut self, entry: PendingEntry) {
        self.pending_entries.insert(entry.symbol.clone(), entry);
        self.revision += 1;
    }

    pub fn take_pending_entry(&mut self, symbol: &str) -> Option<PendingEntry> {
        let taken = self.pending_entries.remove(symbol);
        if taken.is_some() {
            self.revision += 1;
        }
        taken
    }

    /// Count one more unconfirmed cycle for a pending entry and return the new count.
    pub fn age_pending_entry(&mut self, symbol: &str) -> Option<u32> {
        let entry = self.pending_entries.get_mut(symbol)?;
        entry.cycles_waiting += 1;
        self.revision += 1;
        Some(entry.cycles_waiting)
    }

    /// Bot positions still holding units, plus pending entries.
    pub fn bot_open_count(&self) -> usize {
        let held = self
            .positions
            .values()
            .filter(|p| p.is_bot_entered() && p.state != PositionState::Closed)
            .count();
        held + self.pending_entries.len()
    }

    /// Capital tied up in bot positions at entry cost, plus pending entries.
    pub fn deployed_capital(&self) -> f64 {
        let held: f64 = self
            .positions
            .values()
            .filter(|p| p.is_bot_entered() && p.state != PositionState::Closed)
            .map(Position::cost_basis)
            .sum();
        let pending: f64 = self
            .pending_entries
            .values()
            .map(PendingEntry::committed_capital)
            .sum();
        held + pending
    }

    pub fn total_unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }
}
