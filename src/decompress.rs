//! Decompression driver.

use std::io::{BufReader, BufWriter, Read, Write};

use byteorder::{BigEndian, ReadBytesExt};

use crate::model::Model;
use crate::range_coder::RangeDecoder;
use crate::{Error, Result, DIST_LEN, EOS, ESCAPE, MAGIC, SELF};

/// Decompresses a stream produced by [`compress()`](crate::compress()).
///
/// Returns the number of plaintext bytes written after verifying the
/// checksum trailer. A single diagnostic line goes to `err` on failure.
///
/// # Arguments
/// * `input` - Compressed stream
/// * `output` - Destination of the plaintext
/// * `err` - Sink for the one-line report
pub fn decompress<R: Read, W: Write, E: Write>(input: R, output: W, mut err: E) -> Result<u64> {
    match run(input, output) {
        Ok(written) => Ok(written),
        Err(e) => {
            let _ = writeln!(err, "{SELF}: {e}");
            Err(e)
        }
    }
}

fn run<R: Read, W: Write>(input: R, output: W) -> Result<u64> {
    let mut input = BufReader::new(input);
    let mut output = BufWriter::new(output);

    let mut magic = [0u8; MAGIC.len()];
    if input.read_exact(&mut magic).is_err() || magic != MAGIC {
        return Err(Error::BadSignature);
    }
    let order = input.read_u8()? as u32;
    let limit = input.read_u16::<BigEndian>()? as u32;
    let bootstrap = match input.read_u8()? as u32 {
        0 => None,
        size => Some(size),
    };
    let mut model = Model::new(order, limit, bootstrap)?;

    let mut crc = crc32fast::Hasher::new();
    let mut dist = [0u32; DIST_LEN];
    let mut written = 0u64;
    {
        let mut coder = RangeDecoder::new(&mut input)?;
        while !coder.eof() {
            let mut c = ESCAPE;
            for ord in (-1..=model.order() as i32).rev() {
                model.dist(ord, &mut dist);
                c = coder.decode(&dist)?;
                if c != ESCAPE {
                    break;
                }
            }
            if c == ESCAPE {
                return Err(Error::EscapeLeak);
            }
            if c == EOS {
                break;
            }
            let byte = c as u8;
            output.write_all(&[byte])?;
            crc.update(&[byte]);
            model.update(c)?;
            written += 1;
        }
        if coder.eof() {
            return Err(Error::UnexpectedEof);
        }
    }

    // Trailer: roll in every remaining byte, the last four of which are the
    // checksum; the coder may have left a variable amount of fluff behind.
    let mut stored = 0u32;
    for byte in input.bytes() {
        stored = (stored << 8) | byte? as u32;
    }
    let computed = crc.finalize();
    if stored != computed {
        return Err(Error::ChecksumMismatch { stored, computed });
    }

    output.flush()?;
    Ok(written)
}
