use std::collections::{HashMap, VecDeque};

use common::models::{OrderbookSnapshot, Tick};

struct SymbolWindow {
    ticks: VecDeque<Tick>,
    books: VecDeque<OrderbookSnapshot>,
}

/// Per-symbol bounded history of recent observations. Buffers are created
/// on `track` and dropped on `untrack`; insertion evicts the oldest entry
/// once a buffer is at capacity. Single-writer: only the engine task that
/// consumes the market-event channel mutates this store.
pub struct SignalWindowStore {
    capacity: usize,
    windows: HashMap<String, SymbolWindow>,
}

impl SignalWindowStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            windows: HashMap::new(),
        }
    }

    pub fn track(&mut self, symbol: &str) {
        self.windows.entry(symbol.to_string()).or_insert_with(|| SymbolWindow {
            ticks: VecDeque::with_capacity(self.capacity),
            books: VecDeque::with_capacity(self.capacity),
        });
    }

    pub fn untrack(&mut self, symbol: &str) {
        self.windows.remove(symbol);
    }

    pub fn record_tick(&mut self, symbol: &str, tick: Tick) {
        let capacity = self.capacity;
        if let Some(window) = self.windows.get_mut(symbol) {
            if window.ticks.len() == capacity {
                window.ticks.pop_front();
            }
            window.ticks.push_back(tick);
        }
    }

    pub fn record_book(&mut self, symbol: &str, book: OrderbookSnapshot) {
        let capacity = self.capacity;
        if let Some(window) = self.windows.get_mut(symbol) {
            if window.books.len() == capacity {
                window.books.pop_front();
            }
            window.books.push_back(book);
        }
    }

    /// Current tick contents, oldest to newest.
    pub fn ticks(&self, symbol: &str) -> Vec<Tick> {
        self.windows
            .get(symbol)
            .map(|w| w.ticks.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn books(&self, symbol: &str) -> Vec<OrderbookSnapshot> {
        self.windows
            .get(symbol)
            .map(|w| w.books.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Indicators only fire on a full window.
    pub fn is_full(&self, symbol: &str) -> bool {
        self.windows
            .get(symbol)
            .map(|w| w.ticks.len() == self.capacity)
            .unwrap_or(false)
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.windows
            .get(symbol)
            .and_then(|w| w.ticks.back())
            .map(|t| t.price)
    }
}
