//! Arithmetic bit coder.
//!
//! The incremental coder of Witten, Neal and Cleary ("Arithmetic coding for
//! data compression", CACM 30(6), 1987), run over 64-bit registers with a
//! 32-bit code window. Symbols are coded against the cumulative tables the
//! model builds; the total mass is the final entry of the table.

use std::io::{self, Read, Write};

use crate::{hi, lo, DIST_LEN, EOS};

const CODE_VALUE_BITS: u32 = 32;
const TOP_VALUE: u64 = (1 << CODE_VALUE_BITS) - 1;
const FIRST_QUARTER: u64 = TOP_VALUE / 4 + 1;
const HALF: u64 = 2 * FIRST_QUARTER;
const THIRD_QUARTER: u64 = 3 * FIRST_QUARTER;

pub(crate) struct RangeEncoder<W: Write> {
    out: W,
    low: u64,
    high: u64,
    /// Bits owed with the opposite value of the next settled bit.
    pending: u64,
    buffer: u8,
    bits_free: u8,
    written: u64,
}

impl<W: Write> RangeEncoder<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            low: 0,
            high: TOP_VALUE,
            pending: 0,
            buffer: 0,
            bits_free: 8,
            written: 0,
        }
    }

    /// Bytes emitted so far, including the tail written by `finish`.
    pub(crate) fn len(&self) -> u64 {
        self.written
    }

    /// Narrows the code region to the interval of symbol `c` and emits the
    /// bits that settled.
    pub(crate) fn encode(&mut self, c: u16, dist: &[u32; DIST_LEN]) -> io::Result<()> {
        debug_assert!(dist[lo(c)] < dist[hi(c)], "symbol {c} has no frequency");
        let total = dist[hi(EOS)] as u64;
        let range = self.high - self.low + 1;
        self.high = self.low + range * dist[hi(c)] as u64 / total - 1;
        self.low += range * dist[lo(c)] as u64 / total;
        loop {
            if self.high < HALF {
                self.emit(false)?;
            } else if self.low >= HALF {
                self.emit(true)?;
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= FIRST_QUARTER && self.high < THIRD_QUARTER {
                self.pending += 1;
                self.low -= FIRST_QUARTER;
                self.high -= FIRST_QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
        }
        Ok(())
    }

    /// Writes the disambiguating tail: one bit naming the live quarter, byte
    /// padding, and a full code window of zero fluff so the decoder's
    /// lookahead never starves before the end-of-stream symbol.
    pub(crate) fn finish(&mut self) -> io::Result<()> {
        self.pending += 1;
        let bit = self.low >= FIRST_QUARTER;
        self.emit(bit)?;
        if self.bits_free != 8 {
            self.buffer <<= self.bits_free;
            self.out.write_all(&[self.buffer])?;
            self.written += 1;
        }
        for _ in 0..CODE_VALUE_BITS / 8 {
            self.out.write_all(&[0])?;
            self.written += 1;
        }
        self.out.flush()
    }

    fn emit(&mut self, bit: bool) -> io::Result<()> {
        self.push_bit(bit)?;
        while self.pending > 0 {
            self.push_bit(!bit)?;
            self.pending -= 1;
        }
        Ok(())
    }

    fn push_bit(&mut self, bit: bool) -> io::Result<()> {
        self.buffer = (self.buffer << 1) | bit as u8;
        self.bits_free -= 1;
        if self.bits_free == 0 {
            self.out.write_all(&[self.buffer])?;
            self.written += 1;
            self.buffer = 0;
            self.bits_free = 8;
        }
        Ok(())
    }
}

pub(crate) struct RangeDecoder<R: Read> {
    input: R,
    low: u64,
    high: u64,
    /// Code word currently being resolved.
    value: u64,
    buffer: u8,
    bits_left: u8,
    eof: bool,
}

impl<R: Read> RangeDecoder<R> {
    pub(crate) fn new(input: R) -> io::Result<Self> {
        let mut dec = Self {
            input,
            low: 0,
            high: TOP_VALUE,
            value: 0,
            buffer: 0,
            bits_left: 0,
            eof: false,
        };
        for _ in 0..CODE_VALUE_BITS / 8 {
            let byte = dec.next_byte()?;
            dec.value = (dec.value << 8) | byte as u64;
        }
        Ok(dec)
    }

    /// True once a read ran past the end of the input.
    pub(crate) fn eof(&self) -> bool {
        self.eof
    }

    /// Resolves the next symbol under `dist` and consumes its bits. Returns
    /// `EOS` without touching the input once the input is exhausted.
    pub(crate) fn decode(&mut self, dist: &[u32; DIST_LEN]) -> io::Result<u16> {
        if self.eof {
            return Ok(EOS);
        }
        let total = dist[hi(EOS)] as u64;
        let range = self.high - self.low + 1;
        let target = ((self.value - self.low + 1) * total - 1) / range;

        let mut c = 0u16;
        while (dist[hi(c)] as u64) <= target {
            c += 1;
        }
        // The stream ends at EOS; whatever follows belongs to the trailer.
        if c == EOS {
            return Ok(EOS);
        }

        self.high = self.low + range * dist[hi(c)] as u64 / total - 1;
        self.low += range * dist[lo(c)] as u64 / total;
        loop {
            if self.high < HALF {
                // High bit settled, shift it out below.
            } else if self.low >= HALF {
                self.value -= HALF;
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= FIRST_QUARTER && self.high < THIRD_QUARTER {
                self.value -= FIRST_QUARTER;
                self.low -= FIRST_QUARTER;
                self.high -= FIRST_QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
            self.value = (self.value << 1) | self.read_bit()? as u64;
        }
        Ok(c)
    }

    fn read_bit(&mut self) -> io::Result<u8> {
        if self.bits_left == 0 {
            self.buffer = self.next_byte()?;
            self.bits_left = 8;
        }
        self.bits_left -= 1;
        Ok((self.buffer >> self.bits_left) & 1)
    }

    /// Next input byte; past the end it yields filler and raises the eof
    /// flag instead of failing, since the last code word may legitimately
    /// need a few bits the encoder never wrote.
    fn next_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0xFF);
                }
                Ok(_) => return Ok(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ALPHA;

    /// Cumulative table with weight 1 for every symbol, EOS included.
    fn uniform() -> [u32; DIST_LEN] {
        let mut dist = [0u32; DIST_LEN];
        for c in 0..=EOS {
            dist[hi(c)] = c as u32 + 1;
        }
        dist
    }

    /// Cumulative table with the given weights for a three-symbol alphabet
    /// in slots 0..3, EOS taking the remainder of the mass.
    fn skewed() -> [u32; DIST_LEN] {
        let mut dist = [0u32; DIST_LEN];
        let weights = [900u32, 90, 9];
        let mut run = 0;
        for c in 0..=EOS {
            if (c as usize) < weights.len() {
                run += weights[c as usize];
            }
            dist[hi(c)] = run;
        }
        dist[hi(EOS)] = run + 1;
        dist
    }

    fn roundtrip(symbols: &[u16], dist: &[u32; DIST_LEN]) {
        let mut packed = Vec::new();
        let mut encoder = RangeEncoder::new(&mut packed);
        for &c in symbols {
            encoder.encode(c, dist).unwrap();
        }
        encoder.encode(EOS, dist).unwrap();
        encoder.finish().unwrap();
        let emitted = encoder.len();
        drop(encoder);
        assert_eq!(emitted, packed.len() as u64);

        let mut decoder = RangeDecoder::new(packed.as_slice()).unwrap();
        for &c in symbols {
            assert_eq!(decoder.decode(dist).unwrap(), c);
        }
        assert_eq!(decoder.decode(dist).unwrap(), EOS);
        assert!(!decoder.eof());
    }

    #[test]
    fn uniform_symbols_roundtrip() {
        roundtrip(&[0, 1, 65, 255, ALPHA, 256, 13], &uniform());
    }

    #[test]
    fn skewed_symbols_roundtrip() {
        let symbols: Vec<u16> = (0..500).map(|i| [0, 0, 0, 1, 0, 2, 0, 1][i % 8]).collect();
        roundtrip(&symbols, &skewed());
    }

    #[test]
    fn eos_only_roundtrip() {
        roundtrip(&[], &uniform());
    }

    #[test]
    fn exhausted_input_reports_eof() {
        let mut decoder = RangeDecoder::new(&[][..]).unwrap();
        assert!(decoder.eof());
        assert_eq!(decoder.decode(&uniform()).unwrap(), EOS);
    }
}
