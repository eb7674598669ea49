//! Rewriting of the R8 map id embedded in DEX containers.
//!
//! The map id shows up in two textual forms inside the dex body: a
//! `pg-map-id":"…"` field in R8's build-metadata blob, and synthesized
//! source file names of the form `r8-map-id-…`. Both are rewritten as
//! literal byte splices rather than through the string pool, which keeps the
//! diff against the official container minimal. Any body change invalidates
//! the header's SHA-1 signature and Adler-32 checksum, so both are
//! recomputed, signature first.

use adler::adler32_slice;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use sha1::{Digest, Sha1};

use crate::error::{PatchError, PatchResult};
use crate::raw::crc32;

/// First four bytes of every dex file; a 3-digit version and a NUL follow.
pub const DEX_MAGIC: [u8; 4] = *b"dex\n";

/// magic (8) + checksum (4) + signature (20); the body starts here.
const HEADER_PREFIX_LEN: usize = 32;

// Newer R8 emits long map ids, 52+ hex chars; accept the whole 32-64 range.
static PG_MAP_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"pg-map-id":"([0-9a-f]{32,64})""#).unwrap());
static R8_MAP_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"r8-map-id-([0-9a-f]{32,64})").unwrap());

/// One `pg-map-id` rewrite, retained for logging and the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapIdRewrite {
    pub old: String,
    pub new: String,
}

/// Result of patching a single dex container.
#[derive(Debug, Clone)]
pub struct DexPatchOutcome {
    /// The container bytes, re-signed if anything changed.
    pub bytes: Vec<u8>,
    /// CRC-32 of `bytes`: the checksum the archive format and the baseline
    /// profile record for this entry, distinct from the container's internal
    /// Adler-32 field.
    pub entry_checksum: u32,
    pub modified: bool,
    pub pg_map_id: Option<MapIdRewrite>,
    /// `r8-map-id-` occurrences rewritten, and skipped on length mismatch.
    pub source_strings_rewritten: usize,
    pub source_strings_skipped: usize,
}

/// Rewrite every map-id marker in `data` to `map_id` and re-sign the
/// container. A container without markers is returned unchanged; that is a
/// valid outcome, not an error.
pub fn patch_map_id(entry: &str, data: &[u8], map_id: &str) -> PatchResult<DexPatchOutcome> {
    check_magic(entry, data)?;
    let body = &data[HEADER_PREFIX_LEN..];

    let (mut fixed_body, pg_map_id) = rewrite_pg_map_id(entry, body, map_id);
    let (rewritten, skipped) = rewrite_source_strings(entry, &mut fixed_body, map_id);

    if fixed_body.as_slice() == body {
        if pg_map_id.is_none() && rewritten == 0 {
            warn!("{entry}: no map-id marker found, container left unmodified");
        }
        return Ok(DexPatchOutcome {
            entry_checksum: crc32(data),
            bytes: data.to_vec(),
            modified: false,
            pg_map_id,
            source_strings_rewritten: rewritten,
            source_strings_skipped: skipped,
        });
    }

    let signature = compute_sha1(&fixed_body);
    info!(
        "{entry}: signature {} -> {}",
        hex(&data[12..HEADER_PREFIX_LEN]),
        hex(&signature)
    );

    let mut fixed = Vec::with_capacity(HEADER_PREFIX_LEN + fixed_body.len());
    fixed.extend_from_slice(&data[..8]);
    fixed.extend_from_slice(&[0u8; 4]);
    fixed.extend_from_slice(&signature);
    fixed.extend_from_slice(&fixed_body);
    let checksum = adler32_slice(&fixed[12..]);
    fixed[8..12].copy_from_slice(&checksum.to_le_bytes());

    let old_checksum = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    info!("{entry}: checksum 0x{old_checksum:x} -> 0x{checksum:x}");

    Ok(DexPatchOutcome {
        entry_checksum: crc32(&fixed),
        bytes: fixed,
        modified: true,
        pg_map_id,
        source_strings_rewritten: rewritten,
        source_strings_skipped: skipped,
    })
}

fn check_magic(entry: &str, data: &[u8]) -> PatchResult<()> {
    if data.len() < HEADER_PREFIX_LEN || data[..4] != DEX_MAGIC {
        return Err(PatchError::UnsupportedMagic {
            entry: entry.to_string(),
            magic: data.get(..8).unwrap_or(data).to_vec(),
        });
    }
    let version = &data[4..8];
    if version[3] != 0 || !version[..3].iter().all(u8::is_ascii_digit) {
        return Err(PatchError::UnsupportedVersion {
            entry: entry.to_string(),
            version: version.to_vec(),
        });
    }
    info!(
        "{entry}: dex version {}",
        String::from_utf8_lossy(&version[..3])
    );
    Ok(())
}

/// Rewrite the hex payload of the last `pg-map-id":"…"` occurrence. The
/// field is a self-delimited quoted string, so the replacement may change
/// its length.
fn rewrite_pg_map_id(entry: &str, body: &[u8], map_id: &str) -> (Vec<u8>, Option<MapIdRewrite>) {
    let group = match PG_MAP_ID.captures_iter(body).last().and_then(|c| c.get(1)) {
        Some(group) => group,
        None => return (body.to_vec(), None),
    };
    let old = String::from_utf8_lossy(group.as_bytes()).into_owned();
    info!("{entry}: pg-map-id {old} -> {map_id}");

    let mut out = Vec::with_capacity(body.len() + map_id.len());
    out.extend_from_slice(&body[..group.start()]);
    out.extend_from_slice(map_id.as_bytes());
    out.extend_from_slice(&body[group.end()..]);
    let rewrite = MapIdRewrite {
        old,
        new: map_id.to_string(),
    };
    (out, Some(rewrite))
}

/// Rewrite `r8-map-id-…` occurrences in place. The surrounding string-pool
/// length prefix is not rewritten, so only equal-length replacements are
/// safe; mismatches are skipped rather than corrupting the container.
fn rewrite_source_strings(entry: &str, body: &mut [u8], map_id: &str) -> (usize, usize) {
    let ranges: Vec<(usize, usize)> = R8_MAP_ID
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|g| (g.start(), g.end())))
        .collect();

    let mut rewritten = 0;
    let mut skipped = 0;
    for (start, end) in ranges {
        if end - start != map_id.len() {
            warn!(
                "{entry}: r8-map-id string has {} hex chars, target has {}, skipped",
                end - start,
                map_id.len()
            );
            skipped += 1;
            continue;
        }
        info!(
            "{entry}: r8-map-id string {} -> {map_id}",
            String::from_utf8_lossy(&body[start..end])
        );
        body[start..end].copy_from_slice(map_id.as_bytes());
        rewritten += 1;
    }
    (rewritten, skipped)
}

fn compute_sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
