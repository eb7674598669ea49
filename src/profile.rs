//! Patching of ART baseline profiles (`assets/dexopt/baseline.prof`).
//!
//! The profile stores one record per dex file, keyed by entry name and
//! carrying that container's CRC-32. After the dex containers are re-signed
//! those checksums are stale, so the matching records are rewritten and the
//! compressed block is re-emitted.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::info;

use crate::error::{PatchError, PatchResult};
use crate::raw::{read_bytes, read_u16, read_u32, read_u8, write_u16, write_u32};

pub const PROFILE_MAGIC: [u8; 4] = *b"pro\0";

/// The only profile layout this patcher understands ("010 P").
pub const PROFILE_VERSION_010_P: [u8; 4] = *b"010\0";

// The profile is produced fresh by the build rather than preserved against
// an external reference, and its producer compresses at level 1.
const PROFILE_DEFLATE_LEVEL: u32 = 1;

/// Replace the per-dex checksum of every record whose key appears in
/// `checksums`; records with unknown keys pass through untouched.
pub fn patch_checksums(
    entry: &str,
    data: &[u8],
    checksums: &BTreeMap<String, u32>,
) -> PatchResult<Vec<u8>> {
    let magic = data
        .get(..4)
        .ok_or_else(|| PatchError::truncated(entry, "profile magic"))?;
    if magic != PROFILE_MAGIC {
        return Err(PatchError::UnsupportedMagic {
            entry: entry.to_string(),
            magic: magic.to_vec(),
        });
    }
    let version = data
        .get(4..8)
        .ok_or_else(|| PatchError::truncated(entry, "profile version"))?;
    if version != PROFILE_VERSION_010_P {
        return Err(PatchError::UnsupportedVersion {
            entry: entry.to_string(),
            version: version.to_vec(),
        });
    }
    info!("{entry}: profile version 010 P");

    let mut ix = 8;
    let num_dex_files = read_u8(data, &mut ix)
        .ok_or_else(|| PatchError::truncated(entry, "profile header"))?;
    let uncompressed_size = read_u32(data, &mut ix)
        .ok_or_else(|| PatchError::truncated(entry, "profile header"))?;
    let compressed_size = read_u32(data, &mut ix)
        .ok_or_else(|| PatchError::truncated(entry, "profile header"))?;

    let payload = &data[ix..];
    if payload.len() as u64 != compressed_size as u64 {
        return Err(PatchError::SizeMismatch {
            entry: entry.to_string(),
            field: "compressed size",
            expected: compressed_size as u64,
            actual: payload.len() as u64,
        });
    }
    let mut inflated = Vec::with_capacity(uncompressed_size as usize);
    ZlibDecoder::new(payload).read_to_end(&mut inflated)?;
    if inflated.len() as u64 != uncompressed_size as u64 {
        return Err(PatchError::SizeMismatch {
            entry: entry.to_string(),
            field: "uncompressed size",
            expected: uncompressed_size as u64,
            actual: inflated.len() as u64,
        });
    }

    let mut fixed = Vec::with_capacity(inflated.len());
    let mut ix = 0;
    for _ in 0..num_dex_files {
        let profile_key_size = read_u16(&inflated, &mut ix)
            .ok_or_else(|| PatchError::truncated(entry, "profile record header"))?;
        let num_type_ids = read_u16(&inflated, &mut ix)
            .ok_or_else(|| PatchError::truncated(entry, "profile record header"))?;
        let hot_method_region_size = read_u32(&inflated, &mut ix)
            .ok_or_else(|| PatchError::truncated(entry, "profile record header"))?;
        let dex_checksum = read_u32(&inflated, &mut ix)
            .ok_or_else(|| PatchError::truncated(entry, "profile record header"))?;
        let num_method_ids = read_u32(&inflated, &mut ix)
            .ok_or_else(|| PatchError::truncated(entry, "profile record header"))?;
        let profile_key = read_bytes(&inflated, &mut ix, profile_key_size as usize)
            .ok_or_else(|| PatchError::truncated(entry, "profile key"))?;

        let fixed_checksum = std::str::from_utf8(profile_key)
            .ok()
            .and_then(|key| checksums.get(key).copied())
            .unwrap_or(dex_checksum);
        if fixed_checksum != dex_checksum {
            info!(
                "{entry}: {} checksum 0x{dex_checksum:x} -> 0x{fixed_checksum:x}",
                String::from_utf8_lossy(profile_key)
            );
        }

        write_u16(&mut fixed, profile_key_size);
        write_u16(&mut fixed, num_type_ids);
        write_u32(&mut fixed, hot_method_region_size);
        write_u32(&mut fixed, fixed_checksum);
        write_u32(&mut fixed, num_method_ids);
        fixed.extend_from_slice(profile_key);
    }
    // Method/class data after the record table is carried through untouched.
    fixed.extend_from_slice(&inflated[ix..]);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(PROFILE_DEFLATE_LEVEL));
    encoder.write_all(&fixed)?;
    let deflated = encoder.finish()?;

    let mut out = Vec::with_capacity(17 + deflated.len());
    out.extend_from_slice(&PROFILE_MAGIC);
    out.extend_from_slice(&PROFILE_VERSION_010_P);
    out.push(num_dex_files);
    write_u32(&mut out, fixed.len() as u32);
    write_u32(&mut out, deflated.len() as u32);
    out.extend_from_slice(&deflated);
    Ok(out)
}
