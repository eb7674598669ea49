//! The patch pipeline: dex entries first, then the baseline profile, then a
//! byte-faithful rewrite of the archive.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::apk::ApkArchive;
use crate::dex::{self, MapIdRewrite};
use crate::error::{PatchError, PatchResult};
use crate::profile;

/// Archive path of the ahead-of-time profile, when the app ships one.
pub const BASELINE_PROFILE_ENTRY: &str = "assets/dexopt/baseline.prof";

// Bytecode container naming convention: classes.dex, classes2.dex, ...
static CLASSES_DEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^classes[0-9]*\.dex$").unwrap());

/// What a patch run did to one dex entry.
#[derive(Debug, Clone)]
pub struct DexEntrySummary {
    pub name: String,
    pub modified: bool,
    pub pg_map_id: Option<MapIdRewrite>,
    pub source_strings_rewritten: usize,
    pub source_strings_skipped: usize,
    /// CRC-32 of the (possibly re-signed) container, as recorded in the
    /// archive and the baseline profile.
    pub container_checksum: u32,
}

/// Result of a whole patch run.
#[derive(Debug, Clone, Default)]
pub struct PatchSummary {
    pub dex_entries: Vec<DexEntrySummary>,
    /// True when a baseline profile entry was present and rewritten.
    pub profile_patched: bool,
}

/// Patch every `classes*.dex` entry of the archive at `input` to carry
/// `map_id`, fix up the baseline profile if one is present, and write the
/// result to `output`. All other entries round-trip bit-identically.
pub fn patch_apk(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    map_id: &str,
) -> PatchResult<PatchSummary> {
    if !is_valid_map_id(map_id) {
        return Err(PatchError::InvalidMapId(map_id.to_string()));
    }

    let mut apk = ApkArchive::from_file(input)?;
    let dex_names: Vec<String> = apk
        .entry_names()
        .filter(|name| CLASSES_DEX.is_match(name))
        .map(str::to_string)
        .collect();

    // Every dex contributes its container checksum, patched or not, so the
    // profile records stay consistent either way.
    let mut checksums = BTreeMap::new();
    let mut summary = PatchSummary::default();
    for name in &dex_names {
        let data = match apk.entry(name) {
            Some(entry) => entry.data.clone(),
            None => continue,
        };
        info!("patching {name}");
        let outcome = dex::patch_map_id(name, &data, map_id)?;
        checksums.insert(name.clone(), outcome.entry_checksum);
        summary.dex_entries.push(DexEntrySummary {
            name: name.clone(),
            modified: outcome.modified,
            pg_map_id: outcome.pg_map_id,
            source_strings_rewritten: outcome.source_strings_rewritten,
            source_strings_skipped: outcome.source_strings_skipped,
            container_checksum: outcome.entry_checksum,
        });
        if outcome.modified {
            apk.replace_entry(name, outcome.bytes);
        }
    }

    let profile_data = apk.entry(BASELINE_PROFILE_ENTRY).map(|e| e.data.clone());
    if let Some(data) = profile_data {
        info!("patching {BASELINE_PROFILE_ENTRY}");
        let patched = profile::patch_checksums(BASELINE_PROFILE_ENTRY, &data, &checksums)?;
        apk.replace_entry(BASELINE_PROFILE_ENTRY, patched);
        summary.profile_patched = true;
    }

    apk.write_to_file(output)?;
    Ok(summary)
}

fn is_valid_map_id(map_id: &str) -> bool {
    (32..=64).contains(&map_id.len())
        && map_id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
