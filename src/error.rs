use std::fmt;
use std::io;

/// Result alias for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;

/// Errors surfaced while patching an archive.
///
/// Every fatal variant aborts the run before an output file exists and
/// carries the offending entry name, so callers can report exactly which
/// container failed and which invariant it violated.
#[derive(Debug)]
pub enum PatchError {
    Io(io::Error),
    Zip(zip::result::ZipError),
    /// The requested map id is not 32-64 lowercase hex characters.
    InvalidMapId(String),
    /// A container's magic bytes were not recognized.
    UnsupportedMagic { entry: String, magic: Vec<u8> },
    /// A container's version is not one this patcher understands.
    UnsupportedVersion { entry: String, version: Vec<u8> },
    /// An archive entry uses a compression method other than stored or deflate.
    UnsupportedCompression { entry: String, method: u16 },
    /// No candidate level reproduces an entry's original compressed stream.
    UndeterminedCompressionLevel { entry: String },
    /// A declared size field disagrees with the actual data.
    SizeMismatch {
        entry: String,
        field: &'static str,
        expected: u64,
        actual: u64,
    },
    /// A container ended before a required field.
    Truncated {
        entry: String,
        context: &'static str,
    },
}

impl PatchError {
    pub(crate) fn truncated(entry: &str, context: &'static str) -> Self {
        PatchError::Truncated {
            entry: entry.to_string(),
            context,
        }
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::Io(err) => write!(f, "I/O error: {err}"),
            PatchError::Zip(err) => write!(f, "ZIP error: {err}"),
            PatchError::InvalidMapId(id) => {
                write!(f, "map id {id:?} is not 32-64 lowercase hex characters")
            }
            PatchError::UnsupportedMagic { entry, magic } => {
                write!(f, "{entry}: unsupported magic {magic:02x?}")
            }
            PatchError::UnsupportedVersion { entry, version } => {
                write!(f, "{entry}: unsupported version {version:02x?}")
            }
            PatchError::UnsupportedCompression { entry, method } => {
                write!(f, "{entry}: unsupported compression method {method}")
            }
            PatchError::UndeterminedCompressionLevel { entry } => {
                write!(f, "{entry}: unable to determine the original compression level")
            }
            PatchError::SizeMismatch {
                entry,
                field,
                expected,
                actual,
            } => {
                write!(f, "{entry}: declared {field} is {expected} but found {actual}")
            }
            PatchError::Truncated { entry, context } => {
                write!(f, "{entry}: unexpected end of data in {context}")
            }
        }
    }
}

impl std::error::Error for PatchError {}

impl From<io::Error> for PatchError {
    fn from(value: io::Error) -> Self {
        PatchError::Io(value)
    }
}

impl From<zip::result::ZipError> for PatchError {
    fn from(value: zip::result::ZipError) -> Self {
        PatchError::Zip(value)
    }
}
