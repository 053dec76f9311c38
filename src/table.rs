//! Context-frequency table.
//!
//! Maps 64-bit context keys to 16-bit counters under a fixed memory budget,
//! addressed with two hash functions and bounded displacement chains. Each
//! parent context additionally owns a 256-bit bitmap marking which follower
//! bytes currently carry a count; building a distribution consults the bitmap
//! instead of probing the table once per alphabet symbol.
//!
//! A key packs a length tag in the top byte (`0x80 + ord` for a bare context,
//! `0x81 + ord` for a context plus its following byte), up to six context
//! bytes, and the follower byte in the lowest position. The table never
//! grows: when the slot array or the bitmap pool is exhausted it reports
//! itself full and the model clears it.

use crate::MAX_FREQUENCY;

/// Bytes accounted per slot: key, counter, bitmap index, half a bitmap.
const SLOT_BYTES: usize = 8 + 2 + 4 + 16;

/// Displacement chain bound before an insert gives up.
const MAX_KICKS: u32 = 1000;

/// 64-bit words per follower bitmap.
const VEC_WORDS: usize = 4;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Key of the parent context one byte shorter than `key`.
#[inline]
const fn parent_key(key: u64) -> u64 {
    ((key & 0xFF00_0000_0000_0000) - (1 << 56)) | ((key & 0x00FF_FFFF_FFFF_FFFF) >> 8)
}

#[inline]
const fn vec_word(c: u8) -> usize {
    (c >> 6) as usize
}

#[inline]
const fn vec_mask(c: u8) -> u64 {
    1 << (0x3F - (c & 0x3F))
}

pub(crate) struct ContextTable {
    keys: Vec<u64>,
    freqs: Vec<u16>,
    /// Bitmap slot owned by each entry; 0 when none has been claimed.
    followers: Vec<u32>,
    follower_vecs: Vec<u64>,
    follower_at: u32,
    follower_len: u32,
    /// Last parent whose bitmap was located, so consecutive operations on
    /// the same context skip the probe sequence.
    cached_key: u64,
    cached_idx: u32,
    is_full: bool,
}

impl ContextTable {
    /// Builds a table sized from the memory limit in MiB.
    pub(crate) fn new(limit: u32) -> Self {
        let slots = ((limit as usize) << 20) / SLOT_BYTES;
        let follower_len = (slots / 2) as u32;
        Self {
            keys: vec![0; slots],
            freqs: vec![0; slots],
            followers: vec![0; slots],
            follower_vecs: vec![0; follower_len as usize * VEC_WORDS],
            follower_at: 1,
            follower_len,
            cached_key: 0,
            cached_idx: 0,
            is_full: false,
        }
    }

    /// Clears every entry and bitmap; the table is empty afterwards.
    pub(crate) fn reset(&mut self) {
        self.keys.fill(0);
        self.freqs.fill(0);
        self.followers.fill(0);
        self.follower_vecs.fill(0);
        self.follower_at = 1;
        self.cached_key = 0;
        self.cached_idx = 0;
        self.is_full = false;
    }

    /// True once an insert has failed; cleared by [`reset`](Self::reset).
    pub(crate) fn full(&self) -> bool {
        self.is_full
    }

    /// Stored frequency of `key`, or 0 when absent.
    pub(crate) fn count(&self, key: u64) -> u16 {
        match self.find(key) {
            Some(slot) => self.freqs[slot],
            None => 0,
        }
    }

    /// Counts an occurrence of `key`, inserting it when absent and recording
    /// the follower byte in the parent's bitmap. Returns `false` when the
    /// table had no room left; the table is full from then on.
    pub(crate) fn seen(&mut self, key: u64) -> bool {
        let slot = match self.find(key) {
            Some(slot) => slot,
            None => {
                if !self.place(key) {
                    return false;
                }
                match self.find(key) {
                    Some(slot) => slot,
                    None => return false,
                }
            }
        };
        if self.freqs[slot] < MAX_FREQUENCY - 1 {
            self.freqs[slot] += 1;
        }
        self.mark_follower(parent_key(key), (key & 0xFF) as u8)
    }

    /// Follower bitmap of a parent context; all zero when the parent has no
    /// recorded followers. Word 0 covers bytes 0..=63 with byte 0 at the
    /// highest bit.
    pub(crate) fn follower_vec(&mut self, parent: u64) -> [u64; VEC_WORDS] {
        let idx = self.follower_idx(parent);
        if idx == 0 {
            return [0; VEC_WORDS];
        }
        let at = idx as usize * VEC_WORDS;
        let mut vec = [0; VEC_WORDS];
        vec.copy_from_slice(&self.follower_vecs[at..at + VEC_WORDS]);
        vec
    }

    /// Halves every counter. Entries that drop to zero are removed and their
    /// follower bit cleared, so the bitmaps keep matching the live counts.
    pub(crate) fn rescale(&mut self) {
        log::debug!("rescale");
        for slot in 0..self.keys.len() {
            if self.keys[slot] == 0 || self.freqs[slot] == 0 {
                continue;
            }
            self.freqs[slot] >>= 1;
            if self.freqs[slot] == 0 {
                let key = self.keys[slot];
                self.keys[slot] = 0;
                self.followers[slot] = 0;
                self.clear_follower(parent_key(key), (key & 0xFF) as u8);
            }
        }
    }

    fn find(&self, key: u64) -> Option<usize> {
        let a = self.h1(key);
        if self.keys[a] == key {
            return Some(a);
        }
        let b = self.h2(key);
        if self.keys[b] == key {
            return Some(b);
        }
        None
    }

    /// Cuckoo insert: claim the first-choice slot and kick the occupant to
    /// its alternate position, up to the displacement bound. An overlong
    /// chain drops the entry held at the end and marks the table full.
    fn place(&mut self, mut key: u64) -> bool {
        if self.is_full {
            return false;
        }
        let mut pos = self.h1(key);
        let mut freq: u16 = 0;
        let mut follower: u32 = 0;
        for _ in 0..MAX_KICKS {
            if self.keys[pos] == 0 {
                self.keys[pos] = key;
                self.freqs[pos] = freq;
                self.followers[pos] = follower;
                return true;
            }
            std::mem::swap(&mut key, &mut self.keys[pos]);
            std::mem::swap(&mut freq, &mut self.freqs[pos]);
            std::mem::swap(&mut follower, &mut self.followers[pos]);
            pos = if pos == self.h1(key) {
                self.h2(key)
            } else {
                self.h1(key)
            };
        }
        log::debug!("context table full after displacement bound");
        self.is_full = true;
        false
    }

    fn follower_idx(&mut self, parent: u64) -> u32 {
        if parent == self.cached_key {
            return self.cached_idx;
        }
        match self.find(parent) {
            Some(slot) => {
                self.cached_key = parent;
                self.cached_idx = self.followers[slot];
                self.cached_idx
            }
            None => 0,
        }
    }

    /// Sets the bit for follower `c` in the parent's bitmap, inserting the
    /// parent and claiming a bitmap slot on first use.
    fn mark_follower(&mut self, parent: u64, c: u8) -> bool {
        let slot = match self.find(parent) {
            Some(slot) => slot,
            None => {
                if !self.place(parent) {
                    return false;
                }
                match self.find(parent) {
                    Some(slot) => slot,
                    None => return false,
                }
            }
        };
        if self.followers[slot] == 0 {
            if self.follower_at >= self.follower_len {
                log::debug!("context table full, bitmap pool exhausted");
                self.is_full = true;
                return false;
            }
            self.followers[slot] = self.follower_at;
            self.follower_at += 1;
        }
        let idx = self.followers[slot];
        self.cached_key = parent;
        self.cached_idx = idx;
        self.follower_vecs[idx as usize * VEC_WORDS + vec_word(c)] |= vec_mask(c);
        true
    }

    fn clear_follower(&mut self, parent: u64, c: u8) {
        let idx = self.follower_idx(parent);
        if idx == 0 {
            return;
        }
        self.follower_vecs[idx as usize * VEC_WORDS + vec_word(c)] &= !vec_mask(c);
    }

    // FNV-1a over the eight key bytes.
    fn h1(&self, key: u64) -> usize {
        let mut hash = FNV_OFFSET_BASIS;
        for i in 0..8 {
            hash = (hash ^ ((key >> (i * 8)) & 0xFF)).wrapping_mul(FNV_PRIME);
        }
        (hash % self.keys.len() as u64) as usize
    }

    // Jenkins one-at-a-time over the eight key bytes.
    fn h2(&self, key: u64) -> usize {
        let mut hash: u32 = 0;
        for i in 0..8 {
            hash = hash.wrapping_add(((key >> (i * 8)) & 0xFF) as u32);
            hash = hash.wrapping_add(hash << 10);
            hash ^= hash >> 6;
        }
        hash = hash.wrapping_add(hash << 3);
        hash ^= hash >> 11;
        hash = hash.wrapping_add(hash << 15);
        hash as usize % self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashMap;

    /// Child key at order `ord` with packed context bytes and follower `c`.
    fn child_key(ord: u64, ctx: u64, c: u8) -> u64 {
        ((0x81 + ord) << 56) | (ctx << 8) | c as u64
    }

    #[test]
    fn count_starts_at_zero() {
        let table = ContextTable::new(1);
        assert_eq!(table.count(child_key(0, 0, b'a')), 0);
    }

    #[test]
    fn seen_inserts_and_increments() {
        let mut table = ContextTable::new(1);
        let key = child_key(2, 0x4241, b'c');
        assert!(table.seen(key));
        assert_eq!(table.count(key), 1);
        assert!(table.seen(key));
        assert!(table.seen(key));
        assert_eq!(table.count(key), 3);
        assert!(!table.full());
    }

    #[test]
    fn seen_records_follower_bit() {
        let mut table = ContextTable::new(1);
        let parent = (0x82u64 << 56) | 0x4241;
        assert_eq!(table.follower_vec(parent), [0; 4]);

        table.seen(child_key(2, 0x4241, 0));
        table.seen(child_key(2, 0x4241, 63));
        table.seen(child_key(2, 0x4241, 64));
        table.seen(child_key(2, 0x4241, 255));

        let vec = table.follower_vec(parent);
        assert_eq!(vec[0], (1 << 63) | 1);
        assert_eq!(vec[1], 1 << 63);
        assert_eq!(vec[2], 0);
        assert_eq!(vec[3], 1);
    }

    #[test]
    fn followers_are_per_parent() {
        let mut table = ContextTable::new(1);
        table.seen(child_key(1, 0x41, b'x'));
        table.seen(child_key(1, 0x42, b'y'));

        let vec_a = table.follower_vec((0x81u64 << 56) | 0x41);
        let vec_b = table.follower_vec((0x81u64 << 56) | 0x42);
        assert_eq!(vec_a[vec_word(b'x')], vec_mask(b'x'));
        assert_eq!(vec_b[vec_word(b'y')], vec_mask(b'y'));
    }

    #[test]
    fn rescale_halves_and_prunes() {
        let mut table = ContextTable::new(1);
        let keep = child_key(0, 0, b'a');
        let prune = child_key(0, 0, b'b');
        for _ in 0..5 {
            table.seen(keep);
        }
        table.seen(prune);

        table.rescale();
        assert_eq!(table.count(keep), 2);
        assert_eq!(table.count(prune), 0);

        // The pruned entry's bit is gone, the survivor's remains.
        let vec = table.follower_vec(0x80u64 << 56);
        assert_ne!(vec[vec_word(b'a')] & vec_mask(b'a'), 0);
        assert_eq!(vec[vec_word(b'b')] & vec_mask(b'b'), 0);
    }

    #[test]
    fn rescale_twice_is_stable() {
        let mut table = ContextTable::new(1);
        let key = child_key(0, 0, b'a');
        table.seen(key);
        table.rescale();
        assert_eq!(table.count(key), 0);
        table.rescale();
        assert_eq!(table.count(key), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut table = ContextTable::new(1);
        let key = child_key(3, 0x434241, b'd');
        table.seen(key);
        table.reset();
        assert_eq!(table.count(key), 0);
        assert_eq!(table.follower_vec((0x83u64 << 56) | 0x434241), [0; 4]);
        assert!(!table.full());
    }

    #[test]
    fn counts_saturate_below_ceiling() {
        let mut table = ContextTable::new(1);
        let key = child_key(0, 0, 0x41);
        for _ in 0..(MAX_FREQUENCY as u32 + 100) {
            table.seen(key);
        }
        assert_eq!(table.count(key), MAX_FREQUENCY - 1);
    }

    #[test]
    fn matches_reference_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut table = ContextTable::new(1);
        let mut reference: HashMap<u64, u16> = HashMap::new();

        // Stay well below capacity so no insert ever fails.
        let keys: Vec<u64> = (0..512)
            .map(|_| child_key(rng.gen_range(0..6), rng.gen::<u64>() & 0xFFFF_FFFF_FFFF, rng.gen()))
            .collect();

        for _ in 0..20_000 {
            match rng.gen_range(0..100) {
                0 => {
                    table.rescale();
                    reference.retain(|_, freq| {
                        *freq >>= 1;
                        *freq > 0
                    });
                }
                1 => {
                    table.reset();
                    reference.clear();
                }
                _ => {
                    let key = keys[rng.gen_range(0..keys.len())];
                    assert!(table.seen(key));
                    let freq = reference.entry(key).or_insert(0);
                    *freq = (*freq + 1).min(MAX_FREQUENCY - 1);
                }
            }
        }

        for key in &keys {
            assert_eq!(table.count(*key), reference.get(key).copied().unwrap_or(0));
        }
    }
}
