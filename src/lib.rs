//! # Dexpatch
//!
//! A library for reconciling the one expected difference between a locally
//! rebuilt APK and an official release: the compiler-assigned map id that R8
//! embeds in `classes*.dex`. The map id is rewritten in place, the dex
//! SHA-1 signature and Adler-32 checksum are recomputed, the baseline
//! profile's per-dex checksums are fixed up to match, and the archive is
//! re-emitted with every other entry and its metadata bit-identical,
//! including re-deriving the deflate level each compressed entry was
//! originally written with.
//!
//! # Examples
//!
//! ```no_run
//! use dexpatch::patch_apk;
//!
//! let map_id = "30af2ffd2b1797e04e99cbb73c450bc0ac1f52ab";
//! let summary = patch_apk("rebuilt.apk", "patched.apk", map_id).unwrap();
//! println!("{:} dex containers processed.", summary.dex_entries.len());
//! ```

pub mod apk;
pub mod dex;
pub mod error;
pub mod level;
pub mod patch;
pub mod profile;
mod raw;
mod tests;

pub use error::{PatchError, PatchResult};
pub use patch::{patch_apk, DexEntrySummary, PatchSummary, BASELINE_PROFILE_ENTRY};
