use crate::job::Outcome;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Outcome and symbol counters shared by every job of a run
#[derive(Default)]
pub struct Stats {
    unknown: DashMap<String, u64>,
    error: DashMap<String, u64>,
    done: DashMap<String, u64>,
    symbols: DashMap<char, u64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, extension: &str, outcome: Outcome) {
        let table = match outcome {
            Outcome::Unknown => &self.unknown,
            Outcome::Error => &self.error,
            Outcome::Done => &self.done,
        };
        *table.entry(extension.to_string()).or_insert(0) += 1;
    }

    pub fn add_symbol(&self, symbol: char) {
        self.add_symbols(symbol, 1);
    }

    pub fn add_symbols(&self, symbol: char, count: u64) {
        *self.symbols.entry(symbol).or_insert(0) += count;
    }

    pub fn unknown(&self, extension: &str) -> u64 {
        count(&self.unknown, extension)
    }

    pub fn errors(&self, extension: &str) -> u64 {
        count(&self.error, extension)
    }

    pub fn done(&self, extension: &str) -> u64 {
        count(&self.done, extension)
    }

    pub fn symbol(&self, symbol: char) -> u64 {
        self.symbols.get(&symbol).map(|v| *v).unwrap_or(0)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            unknown: collect(&self.unknown),
            error: collect(&self.error),
            done: collect(&self.done),
            symbols: self
                .symbols
                .iter()
                .map(|entry| (entry.key().to_string(), *entry.value()))
                .collect(),
        }
    }
}

fn count(table: &DashMap<String, u64>, extension: &str) -> u64 {
    table.get(extension).map(|v| *v).unwrap_or(0)
}

fn collect(table: &DashMap<String, u64>) -> BTreeMap<String, u64> {
    table
        .iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect()
}

/// Point-in-time copy of the four tables, sorted by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub unknown: BTreeMap<String, u64>,
    pub error: BTreeMap<String, u64>,
    pub done: BTreeMap<String, u64>,
    pub symbols: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    pub fn total_done(&self) -> u64 {
        self.done.values().sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.error.values().sum()
    }

    pub fn total_unknown(&self) -> u64 {
        self.unknown.values().sum()
    }

    /// Multi-line report of all tables.
    pub fn render(&self) -> String {
        format!(
            "Unknown Stat: {}\nError Stat: {}\nDone Stat: {}\nSymbols: {}",
            table_json(&self.unknown),
            table_json(&self.error),
            table_json(&self.done),
            table_json(&self.symbols),
        )
    }

    /// Compact `,:12 .:4` form for the progress bar.
    pub fn symbol_summary(&self) -> String {
        self.symbols
            .iter()
            .map(|(symbol, count)| format!("{symbol}:{count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn table_json(table: &BTreeMap<String, u64>) -> String {
    serde_json::to_string(table).unwrap_or_else(|_| format!("{table:?}"))
}

/// Rate-limits snapshot printing. A request arriving inside the interval is kept
/// pending and served by the next tick, so bursts coalesce into one report.
pub struct ThrottledReporter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
    pending: AtomicBool,
}

impl ThrottledReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
            pending: AtomicBool::new(false),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True when the caller should report now.
    pub fn should_report(&self) -> bool {
        self.should_report_at(Instant::now())
    }

    pub fn should_report_at(&self, now: Instant) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "Reporter lock poisoned, skipping report");
                return false;
            }
        };

        match *last {
            Some(at) if now.saturating_duration_since(at) < self.interval => {
                self.pending.store(true, Ordering::Relaxed);
                false
            }
            _ => {
                *last = Some(now);
                self.pending.store(false, Ordering::Relaxed);
                true
            }
        }
    }

    /// Clears and returns whether a report was deferred; the tick path re-checks
    /// the interval before printing.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::Relaxed)
    }
}
