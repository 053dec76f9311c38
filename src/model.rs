//! Prediction by Partial Matching model.
//!
//! Predicts the next byte from the longest matching recent context and falls
//! back to shorter contexts through escape symbols. The escape weight of a
//! context is the number of distinct symbols seen in it, and a coded symbol
//! only adds to the counts of the contexts consulted while coding it, never
//! to their shorter suffixes (update exclusion).

use std::collections::VecDeque;

use crate::table::ContextTable;
use crate::{
    hi, Error, Result, ALPHA, BOOT_MAX, BOOT_MIN, DIST_LEN, EOS, ESCAPE, LIMIT_MAX, LIMIT_MIN,
    MAX_FREQUENCY, ORDER_MAX, ORDER_MIN,
};

/// Adaptive symbol model shared by the encode and decode drivers.
///
/// Per symbol, [`dist`](Self::dist) is called with the order falling from
/// [`order`](Self::order) down to −1 until the symbol is found, then
/// [`update`](Self::update) is called once. Encoder and decoder must issue
/// the identical call sequence or the coded stream desynchronizes.
pub struct Model {
    order: u32,
    table: ContextTable,
    /// Recent bytes, newest at the front.
    context: VecDeque<u8>,
    /// Contexts consulted since the last update.
    visit: Vec<u64>,
    bootstrap: bool,
    history: usize,
}

impl Model {
    /// Creates a model.
    ///
    /// # Arguments
    /// * `order` - Longest context length in bytes, `ORDER_MIN..=ORDER_MAX`
    /// * `limit` - Statistics memory budget in MiB, `LIMIT_MIN..=LIMIT_MAX`
    /// * `bootstrap` - History buffer size in KiB used to re-prime the
    ///   statistics after a reset, `BOOT_MIN..=BOOT_MAX`; `None` resets to
    ///   empty statistics instead
    pub fn new(order: u32, limit: u32, bootstrap: Option<u32>) -> Result<Self> {
        if !(ORDER_MIN..=ORDER_MAX).contains(&order) {
            return Err(Error::OrderOutOfRange(order));
        }
        if !(LIMIT_MIN..=LIMIT_MAX).contains(&limit) {
            return Err(Error::LimitOutOfRange(limit));
        }
        if let Some(size) = bootstrap {
            if !(BOOT_MIN..=BOOT_MAX).contains(&size) {
                return Err(Error::BootstrapOutOfRange(size));
            }
        }
        let history = match bootstrap {
            Some(size) => (size as usize) << 10,
            None => order as usize,
        };
        Ok(Self {
            order,
            table: ContextTable::new(limit),
            context: VecDeque::with_capacity(history),
            visit: Vec::with_capacity(order as usize + 1),
            bootstrap: bootstrap.is_some(),
            history,
        })
    }

    /// Longest context length in bytes.
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Writes the cumulative symbol frequencies at order `ord` into `dist`.
    ///
    /// `dist[hi(c)]` is the right edge of symbol `c`; a symbol can be coded
    /// iff `dist[lo(c)] != dist[hi(c)]`. The calls for one symbol must run
    /// with `ord` falling from [`order`](Self::order); each call adds mass
    /// only for symbols the higher orders left empty, so mass already
    /// claimed is never disturbed. At `ord == -1` every symbol still empty
    /// gets weight 1 (EOS included) and claimed symbols collapse to zero
    /// width, since they would have been coded at their own order.
    pub fn dist(&mut self, ord: i32, dist: &mut [u32; DIST_LEN]) {
        // Topmost call for a symbol starts from an empty distribution.
        if ord == self.order as i32 {
            dist.fill(0);
        }

        if ord < 0 {
            let mut run = 0u32;
            let mut last = 0u32;
            for c in 0..=EOS {
                if dist[hi(c)] == last {
                    run += 1;
                }
                last = dist[hi(c)];
                dist[hi(c)] = run;
            }
            return;
        }

        let ord = ord as usize;

        // Not enough history for this order yet: escape is the only option.
        if self.context.len() < ord {
            dist[hi(ESCAPE)] = 1;
            dist[hi(EOS)] = 1;
            return;
        }

        let mut ctx = 0u64;
        for i in 0..ord {
            ctx |= (self.context[i] as u64) << (i * 8);
        }
        let parent = ((0x80 + ord as u64) << 56) | ctx;
        let keybase = ((0x81 + ord as u64) << 56) | (ctx << 8);

        let vec = self.table.follower_vec(parent);
        if vec == [0; 4] {
            // Context with no recorded followers: escape mass only.
            dist.fill(0);
            dist[hi(ESCAPE)] = 1;
            dist[hi(EOS)] = 1;
            self.visit.push(keybase);
            return;
        }

        let mut run = 0u32;
        let mut last = 0u32;
        let mut syms = 0u32;
        let mut mask = 1u64 << 63;
        let mut word = 0;
        for c in 0..=ALPHA {
            let right = dist[hi(c)];
            // Only symbols without frequency in a higher order draw mass here.
            if right == last && (vec[word] & mask) != 0 {
                let freq = self.table.count(keybase | c as u64) as u32;
                run += freq;
                if freq > 0 {
                    syms += 1;
                }
            }
            run += right - last;
            last = right;
            dist[hi(c)] = run;
            mask >>= 1;
            if mask == 0 {
                mask = 1 << 63;
                word += 1;
            }
        }
        // Escape weight is the count of distinct symbols in this context;
        // EOS carries no mass of its own at any order above the fallback.
        let escape = run + if syms > 0 { syms } else { 1 };
        dist[hi(ESCAPE)] = escape;
        dist[hi(EOS)] = escape;
        self.visit.push(keybase);
    }

    /// Counts symbol `c` in every context consulted since the last update
    /// and appends it to the history.
    ///
    /// Rescales first when any consulted counter is about to hit the
    /// frequency ceiling. A full table is cleared and, when the history
    /// window is complete, re-primed from it.
    pub fn update(&mut self, c: u16) -> Result<()> {
        if c > ALPHA {
            return Err(Error::SymbolOutOfRange(c));
        }

        let near_ceiling = self
            .visit
            .iter()
            .any(|&base| self.table.count(base | c as u64) >= MAX_FREQUENCY - 1);
        if near_ceiling {
            self.table.rescale();
        }

        for i in 0..self.visit.len() {
            self.table.seen(self.visit[i] | c as u64);
        }
        self.visit.clear();

        if self.table.full() {
            log::debug!("context table full, resetting");
            self.table.reset();
            if self.bootstrap && self.context.len() == self.history {
                self.prime();
            }
        }

        if self.context.len() == self.history {
            self.context.pop_back();
        }
        self.context.push_front(c as u8);
        Ok(())
    }

    /// Seeds the freshly cleared table with every context window the history
    /// buffer holds, order by order from 0 up. The newest bytes are
    /// preloaded as a tail so the windows at the oldest positions are still
    /// full width.
    fn prime(&mut self) {
        log::debug!("priming statistics from {} bytes of history", self.history);
        let mut text = 0u64;
        for i in (0..=self.order as usize).rev() {
            text = (text << 8) | self.context[i] as u64;
        }
        let mut mask = 0xFFu64;
        for ord in 0..=self.order as u64 {
            let tag = (0x81 + ord) << 56;
            for i in (0..self.history).rev() {
                text = (text << 8) | self.context[i] as u64;
                if !self.table.seen(tag | (mask & text)) {
                    // The history does not fit; run without primed
                    // statistics from here on.
                    log::debug!("history overflowed the table, bootstrap disabled");
                    self.table.reset();
                    self.bootstrap = false;
                    return;
                }
            }
            mask = (mask << 8) | 0xFF;
        }
    }
}
