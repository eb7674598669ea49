//! In-memory APK (ZIP) reading and byte-faithful rewriting.
//!
//! Reading goes through the `zip` crate; the handful of header fields the
//! high-level API does not expose (flag bits, version tags, DOS timestamps,
//! attributes, extra fields) are read straight out of the raw local and
//! central headers. Writing is done by hand so every preserved field lands
//! back in the output verbatim; only replaced payloads and their checksums
//! may differ from the source archive.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use log::info;
use zip::read::ZipArchive;

use crate::error::{PatchError, PatchResult};
use crate::level::{deflate_bytes, detect_compression_level};
use crate::raw::{crc32, read_bytes, read_u16, read_u32, write_u16, write_u32};

const LOCAL_FILE_SIG: u32 = 0x04034b50;
const CENTRAL_DIR_SIG: u32 = 0x02014b50;
const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054b50;

/// Compression method of an archive entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryCompression {
    Stored,
    Deflated,
}

impl EntryCompression {
    fn method_id(self) -> u16 {
        match self {
            EntryCompression::Stored => 0,
            EntryCompression::Deflated => 8,
        }
    }
}

/// Per-entry metadata restored verbatim when the archive is rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryMeta {
    pub compression: EntryCompression,
    pub flags: u16,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_extra: Vec<u8>,
    pub central_extra: Vec<u8>,
    pub comment: Vec<u8>,
}

/// A single archive entry held in memory.
#[derive(Clone, Debug)]
pub struct ApkEntry {
    pub name: String,
    pub meta: EntryMeta,
    /// Decompressed payload as stored in the source archive.
    pub data: Vec<u8>,
    /// CRC-32 of the raw stored stream, the reference the level oracle
    /// reproduces.
    pub compressed_crc32: u32,
    replacement: Option<Vec<u8>>,
}

impl ApkEntry {
    /// Payload that will be written out: the replacement if one was set.
    pub fn payload(&self) -> &[u8] {
        self.replacement.as_deref().unwrap_or(&self.data)
    }

    pub fn is_replaced(&self) -> bool {
        self.replacement.is_some()
    }
}

/// An APK loaded fully into memory, in central-directory order.
pub struct ApkArchive {
    entries: Vec<ApkEntry>,
}

impl ApkArchive {
    /// Load an archive from disk into memory.
    pub fn from_file(path: impl AsRef<Path>) -> PatchResult<Self> {
        let buf = fs::read(path)?;
        Self::from_bytes(&buf)
    }

    pub fn from_bytes(buf: &[u8]) -> PatchResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(buf))?;
        let mut entries = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let (name, central_start, header_start, data_start, compressed_size) = {
                let file = archive.by_index_raw(idx)?;
                (
                    file.name().to_string(),
                    file.central_header_start() as usize,
                    file.header_start() as usize,
                    file.data_start() as usize,
                    file.compressed_size() as usize,
                )
            };
            let meta = read_entry_meta(&name, buf, central_start, header_start)?;
            let raw = buf
                .get(data_start..data_start + compressed_size)
                .ok_or_else(|| PatchError::truncated(&name, "entry data"))?;
            let compressed_crc32 = crc32(raw);

            let mut data = Vec::new();
            archive.by_index(idx)?.read_to_end(&mut data)?;
            entries.push(ApkEntry {
                name,
                meta,
                data,
                compressed_crc32,
                replacement: None,
            });
        }
        Ok(ApkArchive { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entry names in archive order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[ApkEntry] {
        &self.entries
    }

    /// Borrow an entry by name (e.g. `classes.dex`).
    pub fn entry(&self, name: &str) -> Option<&ApkEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Replace the payload of an existing entry; returns false if the
    /// archive holds no entry of that name.
    pub fn replace_entry(&mut self, name: &str, data: Vec<u8>) -> bool {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.replacement = Some(data);
                true
            }
            None => false,
        }
    }

    /// Serialize the archive and write it to `path` in one shot, so a fatal
    /// error earlier in the pipeline leaves no partial output file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> PatchResult<()> {
        let buffer = self.to_bytes()?;
        fs::write(path, buffer)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> PatchResult<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut central_records = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.is_replaced() {
                info!("writing {} (patched)", entry.name);
            }
            let record = write_local_entry(&mut buffer, entry)?;
            central_records.push(record);
        }
        let central_start = buffer.len() as u32;
        for record in &central_records {
            write_central_directory_entry(&mut buffer, record);
        }
        let central_size = buffer.len() as u32 - central_start;
        write_end_of_central_directory(
            &mut buffer,
            central_records.len(),
            central_size,
            central_start,
        );
        Ok(buffer)
    }
}

struct CentralDirectoryRecord<'a> {
    entry: &'a ApkEntry,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
}

fn write_local_entry<'a>(
    buf: &mut Vec<u8>,
    entry: &'a ApkEntry,
) -> PatchResult<CentralDirectoryRecord<'a>> {
    let offset = buf.len() as u32;
    let meta = &entry.meta;
    let payload = entry.payload();

    let compressed = match meta.compression {
        EntryCompression::Stored => payload.to_vec(),
        EntryCompression::Deflated => {
            // The level is always detected against the source entry, then
            // applied to whatever payload goes out; for untouched entries
            // that reproduces the original stream by construction.
            let level = detect_compression_level(&entry.name, &entry.data, entry.compressed_crc32)?;
            deflate_bytes(payload, level)?
        }
    };
    let crc = if entry.is_replaced() {
        crc32(payload)
    } else {
        meta.crc32
    };

    write_u32(buf, LOCAL_FILE_SIG);
    write_u16(buf, meta.version_needed);
    // Sizes are always written inline, so the data-descriptor flag is dropped.
    write_u16(buf, meta.flags & !0x0008);
    write_u16(buf, meta.compression.method_id());
    write_u16(buf, meta.dos_time);
    write_u16(buf, meta.dos_date);
    write_u32(buf, crc);
    write_u32(buf, compressed.len() as u32);
    write_u32(buf, payload.len() as u32);
    write_u16(buf, entry.name.len() as u16);
    write_u16(buf, meta.local_extra.len() as u16);
    buf.extend_from_slice(entry.name.as_bytes());
    buf.extend_from_slice(&meta.local_extra);
    buf.extend_from_slice(&compressed);

    Ok(CentralDirectoryRecord {
        entry,
        crc32: crc,
        compressed_size: compressed.len() as u32,
        uncompressed_size: payload.len() as u32,
        local_header_offset: offset,
    })
}

fn write_central_directory_entry(buf: &mut Vec<u8>, record: &CentralDirectoryRecord<'_>) {
    let meta = &record.entry.meta;
    write_u32(buf, CENTRAL_DIR_SIG);
    write_u16(buf, meta.version_made_by);
    write_u16(buf, meta.version_needed);
    write_u16(buf, meta.flags & !0x0008);
    write_u16(buf, meta.compression.method_id());
    write_u16(buf, meta.dos_time);
    write_u16(buf, meta.dos_date);
    write_u32(buf, record.crc32);
    write_u32(buf, record.compressed_size);
    write_u32(buf, record.uncompressed_size);
    write_u16(buf, record.entry.name.len() as u16);
    write_u16(buf, meta.central_extra.len() as u16);
    write_u16(buf, meta.comment.len() as u16);
    write_u16(buf, 0); // disk number start
    write_u16(buf, meta.internal_attrs);
    write_u32(buf, meta.external_attrs);
    write_u32(buf, record.local_header_offset);
    buf.extend_from_slice(record.entry.name.as_bytes());
    buf.extend_from_slice(&meta.central_extra);
    buf.extend_from_slice(&meta.comment);
}

fn write_end_of_central_directory(
    buf: &mut Vec<u8>,
    entry_count: usize,
    central_size: u32,
    central_offset: u32,
) {
    write_u32(buf, END_OF_CENTRAL_DIR_SIG);
    write_u16(buf, 0);
    write_u16(buf, 0);
    write_u16(buf, entry_count as u16);
    write_u16(buf, entry_count as u16);
    write_u32(buf, central_size);
    write_u32(buf, central_offset);
    write_u16(buf, 0);
}

/// Pull the preserved metadata bundle out of an entry's raw central header
/// plus the extra field of its local header.
fn read_entry_meta(
    entry: &str,
    buf: &[u8],
    central_start: usize,
    header_start: usize,
) -> PatchResult<EntryMeta> {
    let short = || PatchError::truncated(entry, "central directory record");
    let mut ix = central_start;
    let sig = read_u32(buf, &mut ix).ok_or_else(short)?;
    if sig != CENTRAL_DIR_SIG {
        return Err(short());
    }
    let version_made_by = read_u16(buf, &mut ix).ok_or_else(short)?;
    let version_needed = read_u16(buf, &mut ix).ok_or_else(short)?;
    let flags = read_u16(buf, &mut ix).ok_or_else(short)?;
    let method = read_u16(buf, &mut ix).ok_or_else(short)?;
    let dos_time = read_u16(buf, &mut ix).ok_or_else(short)?;
    let dos_date = read_u16(buf, &mut ix).ok_or_else(short)?;
    let crc = read_u32(buf, &mut ix).ok_or_else(short)?;
    let _compressed_size = read_u32(buf, &mut ix).ok_or_else(short)?;
    let _uncompressed_size = read_u32(buf, &mut ix).ok_or_else(short)?;
    let name_len = read_u16(buf, &mut ix).ok_or_else(short)? as usize;
    let extra_len = read_u16(buf, &mut ix).ok_or_else(short)? as usize;
    let comment_len = read_u16(buf, &mut ix).ok_or_else(short)? as usize;
    let _disk_start = read_u16(buf, &mut ix).ok_or_else(short)?;
    let internal_attrs = read_u16(buf, &mut ix).ok_or_else(short)?;
    let external_attrs = read_u32(buf, &mut ix).ok_or_else(short)?;
    let _local_offset = read_u32(buf, &mut ix).ok_or_else(short)?;
    read_bytes(buf, &mut ix, name_len).ok_or_else(short)?;
    let central_extra = read_bytes(buf, &mut ix, extra_len).ok_or_else(short)?.to_vec();
    let comment = read_bytes(buf, &mut ix, comment_len).ok_or_else(short)?.to_vec();

    let compression = match method {
        0 => EntryCompression::Stored,
        8 => EntryCompression::Deflated,
        other => {
            return Err(PatchError::UnsupportedCompression {
                entry: entry.to_string(),
                method: other,
            })
        }
    };

    let local_extra = read_local_extra(entry, buf, header_start)?;
    Ok(EntryMeta {
        compression,
        flags,
        version_made_by,
        version_needed,
        dos_time,
        dos_date,
        crc32: crc,
        internal_attrs,
        external_attrs,
        local_extra,
        central_extra,
        comment,
    })
}

fn read_local_extra(entry: &str, buf: &[u8], header_start: usize) -> PatchResult<Vec<u8>> {
    let short = || PatchError::truncated(entry, "local file header");
    let mut ix = header_start + 26; // name and extra length fields
    let name_len = read_u16(buf, &mut ix).ok_or_else(short)? as usize;
    let extra_len = read_u16(buf, &mut ix).ok_or_else(short)? as usize;
    ix += name_len;
    Ok(read_bytes(buf, &mut ix, extra_len).ok_or_else(short)?.to_vec())
}
