//! Compression driver.

use std::io::{BufReader, BufWriter, Read, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::model::Model;
use crate::range_coder::RangeEncoder;
use crate::{
    hi, lo, Result, BOOT_DEFAULT, DIST_LEN, EOS, ESCAPE, LIMIT_DEFAULT, MAGIC, ORDER_DEFAULT, SELF,
};

/// Settings for [`compress`].
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Model order, `ORDER_MIN..=ORDER_MAX`.
    pub order: u32,
    /// Model memory limit in MiB, `LIMIT_MIN..=LIMIT_MAX`.
    pub limit: u32,
    /// Bootstrap buffer size in KiB, `BOOT_MIN..=BOOT_MAX`; `None` makes a
    /// full table reset to empty statistics instead of re-priming.
    pub bootstrap: Option<u32>,
    /// Stop after this many input bytes.
    pub max_len: Option<u64>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            order: ORDER_DEFAULT,
            limit: LIMIT_DEFAULT,
            bootstrap: Some(BOOT_DEFAULT),
            max_len: None,
        }
    }
}

/// Compresses `input` into a self-describing stream on `output`.
///
/// Returns the number of plaintext bytes consumed. A single statistics line
/// goes to `err` on success, a single diagnostic line on failure.
///
/// # Arguments
/// * `input` - Plaintext byte stream
/// * `output` - Destination of the compressed stream
/// * `err` - Sink for the one-line report
/// * `options` - Model order, memory limit, bootstrap and length settings
pub fn compress<R: Read, W: Write, E: Write>(
    input: R,
    output: W,
    mut err: E,
    options: &CompressOptions,
) -> Result<u64> {
    match run(input, output, options) {
        Ok((read, written)) => {
            let bpc = if read == 0 {
                0.0
            } else {
                written as f64 * 8.0 / read as f64
            };
            let _ = writeln!(err, "{SELF}: in {read} -> out {written} at {bpc:.3} bpc");
            Ok(read)
        }
        Err(e) => {
            let _ = writeln!(err, "{SELF}: {e}");
            Err(e)
        }
    }
}

fn run<R: Read, W: Write>(
    input: R,
    output: W,
    options: &CompressOptions,
) -> Result<(u64, u64)> {
    let mut model = Model::new(options.order, options.limit, options.bootstrap)?;
    let mut input = BufReader::new(input);
    let mut output = BufWriter::new(output);

    output.write_all(&MAGIC)?;
    output.write_u8(options.order as u8)?;
    output.write_u16::<BigEndian>(options.limit as u16)?;
    output.write_u8(options.bootstrap.unwrap_or(0) as u8)?;

    let mut crc = crc32fast::Hasher::new();
    let mut coder = RangeEncoder::new(&mut output);
    let mut dist = [0u32; DIST_LEN];
    let mut read = 0u64;

    for byte in input.by_ref().bytes() {
        let byte = byte?;
        let c = byte as u16;
        // Walk down the orders until the symbol has frequency, escaping out
        // of every context that cannot produce it.
        for ord in (-1..=model.order() as i32).rev() {
            model.dist(ord, &mut dist);
            if dist[lo(c)] != dist[hi(c)] {
                break;
            }
            coder.encode(ESCAPE, &dist)?;
        }
        coder.encode(c, &dist)?;
        model.update(c)?;
        crc.update(&[byte]);
        read += 1;
        if options.max_len == Some(read) {
            break;
        }
    }

    // Escape down to the fallback and close the stream with EOS.
    for ord in (0..=model.order() as i32).rev() {
        model.dist(ord, &mut dist);
        coder.encode(ESCAPE, &dist)?;
    }
    model.dist(-1, &mut dist);
    coder.encode(EOS, &dist)?;
    coder.finish()?;
    let payload = coder.len();
    drop(coder);

    output.write_u32::<BigEndian>(crc.finalize())?;
    output.flush()?;

    let written = MAGIC.len() as u64 + 1 + 2 + 1 + payload + 4;
    Ok((read, written))
}
