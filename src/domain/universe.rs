//! Symbol universe: the fixed list of instruments the bot may enter.
//!
//! Positions can also exist for symbols outside the universe (external holdings
//! or bot positions whose symbol was later removed from config). Those are still
//! tracked every cycle, after the universe symbols.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub symbols: Vec<String>,
}

impl Universe {
    pub fn new(symbols: Vec<String>) -> Self {
        Universe { symbols }
    }

    pub fn count(&self) -> usize {
        self.symbols.len()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Processing order for one cycle: universe symbols in configured order,
    /// then any other tracked symbols in sorted order, each exactly once.
    pub fn cycle_order<'a, I>(&self, tracked: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut order = self.symbols.clone();
        let mut seen: HashSet<String> = order.iter().cloned().collect();
        let mut extras: Vec<String> = tracked
            .into_iter()
            .filter(|s| !seen.contains(*s))
            .map(str::to_string)
            .collect();
        extras.sort();
        extras.dedup();
        for symbol in extras {
            seen.insert(symbol.clone());
            order.push(symbol);
        }
        order
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    #[error("symbol list is empty")]
    Empty,
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    if input.trim().is_empty() {
        return Err(UniverseError::Empty);
    }

    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}
