//! Deflate level detection for byte-identical recompression.
//!
//! The archive format records nothing about the parameters its entries were
//! compressed with, so the original level is recovered by brute force over a
//! small candidate set and confirmed against the CRC-32 of the original
//! compressed stream.

use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::debug;

use crate::error::{PatchError, PatchResult};
use crate::raw::crc32;

/// Candidate deflate levels, tried most aggressive first so ties resolve
/// identically across runs.
pub const CANDIDATE_LEVELS: [u32; 4] = [9, 6, 4, 1];

/// Raw-deflate `data` at the given level.
pub(crate) fn deflate_bytes(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Find the deflate level whose output reproduces the CRC-32 of the entry's
/// original compressed stream.
///
/// No match is fatal: several levels produce valid but byte-different output
/// for the same payload, and silently picking one would change the archive's
/// bytes.
pub fn detect_compression_level(entry: &str, payload: &[u8], compressed_crc: u32) -> PatchResult<u32> {
    for level in CANDIDATE_LEVELS {
        let recompressed = deflate_bytes(payload, level)?;
        if crc32(&recompressed) == compressed_crc {
            debug!("{entry}: compression level {level}");
            return Ok(level);
        }
    }
    Err(PatchError::UndeterminedCompressionLevel {
        entry: entry.to_string(),
    })
}
