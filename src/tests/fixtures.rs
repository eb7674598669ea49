//! Synthesized containers for the patcher tests. The patcher only reads the
//! 32-byte dex header prefix and raw byte patterns in the body, so a
//! structurally valid fake is as good as a compiled dex.

use std::io::Write;

use adler::adler32_slice;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};

use crate::profile::{PROFILE_MAGIC, PROFILE_VERSION_010_P};
use crate::raw::{write_u16, write_u32};

/// 40 hex chars, the id baked into most fixtures.
pub const OLD_ID: &str = "0123456789abcdef0123456789abcdef01234567";
/// 40 hex chars, same length as [`OLD_ID`].
pub const NEW_ID_SAME_LEN: &str = "89abcdef0123456789abcdef0123456789abcdef";
/// 52 hex chars, the long form newer R8 emits.
pub const NEW_ID_LONG: &str = "fedcba9876543210fedcba9876543210fedcba9876543210abcd";

/// Assemble a valid dex container (version 039) around the given body.
pub fn fake_dex(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + body.len());
    out.extend_from_slice(b"dex\n039\0");
    out.extend_from_slice(&[0u8; 4]);
    let mut hasher = Sha1::new();
    hasher.update(body);
    out.extend_from_slice(&hasher.finalize());
    out.extend_from_slice(body);
    let checksum = adler32_slice(&out[12..]);
    out[8..12].copy_from_slice(&checksum.to_le_bytes());
    out
}

/// A dex body holding R8's metadata blob plus optional source file strings.
pub fn dex_body(pg_id: &str, r8_ids: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"\x00\x13string pool filler\x00");
    body.extend_from_slice(
        format!(
            "{{\"compilation-mode\":\"release\",\"pg-map-id\":\"{pg_id}\",\"version\":\"8.5.10\"}}"
        )
        .as_bytes(),
    );
    for id in r8_ids {
        body.push(0);
        body.extend_from_slice(format!("r8-map-id-{id}.kt").as_bytes());
    }
    body.extend_from_slice(b"\x00class data and map list\x00");
    body
}

/// A dex body with no map-id markers at all.
pub fn plain_dex_body() -> Vec<u8> {
    b"\x00\x07nothing interesting here\x00".to_vec()
}

/// Deterministic payload over a small alphabet, with a long echo of its own
/// prefix, so compressor search depth shows up in the output stream.
pub fn match_rich_payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545f491u32;
    let mut out = Vec::with_capacity(len + len / 2);
    while out.len() < len {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        out.push(b'a' + ((state >> 24) % 16) as u8);
    }
    let echo = out[..len / 2].to_vec();
    out.extend_from_slice(&echo);
    out
}

/// Assemble a baseline profile ("010 P") from
/// (key, type ids, hot region size, checksum, method ids) records.
pub fn fake_profile(records: &[(&str, u16, u32, u32, u32)], trailing: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (key, type_ids, hot_size, checksum, method_ids) in records {
        write_u16(&mut body, key.len() as u16);
        write_u16(&mut body, *type_ids);
        write_u32(&mut body, *hot_size);
        write_u32(&mut body, *checksum);
        write_u32(&mut body, *method_ids);
        body.extend_from_slice(key.as_bytes());
    }
    body.extend_from_slice(trailing);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(1));
    encoder.write_all(&body).expect("compress profile body");
    let compressed = encoder.finish().expect("compress profile body");

    let mut out = Vec::new();
    out.extend_from_slice(&PROFILE_MAGIC);
    out.extend_from_slice(&PROFILE_VERSION_010_P);
    out.push(records.len() as u8);
    write_u32(&mut out, body.len() as u32);
    write_u32(&mut out, compressed.len() as u32);
    out.extend_from_slice(&compressed);
    out
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
