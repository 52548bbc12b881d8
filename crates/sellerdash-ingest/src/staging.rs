//! Upload pre-flight: filename sanitisation and staging to a temp file.
//!
//! Staging makes the one full pass over the raw bytes: it hashes them,
//! enforces the size limit and settles the encoding for every later pass.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use regex::Regex;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::IngestError;
use crate::reader::{resolve_encoding, SNIFF_LEN};

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

const COPY_BUFFER_LEN: usize = 64 * 1024;

/// A submitted filename reduced to a safe stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedFilename {
    pub stem: String,
}

impl SanitizedFilename {
    /// `<stem>_<YYYYmmdd_HHMMSS>_<submitter>.csv`
    #[must_use]
    pub fn stored_name(&self, submitter_id: i64, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}_{submitter_id}.csv",
            self.stem,
            at.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Strip path components and unsafe characters from a submitted filename.
///
/// # Errors
///
/// Returns [`IngestError::NotCsv`] if the extension is not `.csv`
/// (case-insensitive) and [`IngestError::InvalidFilename`] if nothing usable
/// is left of the stem.
pub fn sanitize_filename(filename: &str) -> Result<SanitizedFilename, IngestError> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let path = Path::new(base);
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(IngestError::NotCsv(filename.to_string()));
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let stem = UNSAFE_FILENAME_CHARS.replace_all(stem, "_");
    let stem = stem.trim_matches(|c| c == '.' || c == '_');
    if stem.is_empty() {
        return Err(IngestError::InvalidFilename(filename.to_string()));
    }

    Ok(SanitizedFilename {
        stem: stem.to_string(),
    })
}

/// A staged copy of the upload. The temp file is removed on drop.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    pub size: u64,
    /// Lower-case hex SHA-256 of the raw bytes.
    pub content_hash: String,
    /// Encoding decided from the leading bytes and a UTF-8 check over the
    /// whole file.
    pub encoding: &'static Encoding,
}

impl StagedUpload {
    /// A fresh reader positioned at the start of the staged bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the temp file cannot be reopened.
    pub fn reader(&self) -> io::Result<std::fs::File> {
        let mut file = self.file.reopen()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// UTF-8 validity of a byte stream that arrives in arbitrary pieces. A
/// sequence split across two pieces is carried over, not rejected.
#[derive(Debug, Default)]
struct Utf8Check {
    carry: Vec<u8>,
    invalid: bool,
}

impl Utf8Check {
    fn update(&mut self, bytes: &[u8]) {
        if self.invalid {
            return;
        }
        self.carry.extend_from_slice(bytes);
        match std::str::from_utf8(&self.carry) {
            Ok(_) => self.carry.clear(),
            Err(e) if e.error_len().is_none() => {
                self.carry.drain(..e.valid_up_to());
            }
            Err(_) => {
                self.invalid = true;
                self.carry = Vec::new();
            }
        }
    }

    fn is_valid(&self) -> bool {
        !self.invalid && self.carry.is_empty()
    }
}

/// Copy `source` into a temp file, hashing it and enforcing `max_bytes`.
///
/// # Errors
///
/// Returns [`IngestError::FileTooLarge`] once more than `max_bytes` have been
/// read, or [`IngestError::Io`] on read/write failure.
pub fn stage<R: Read>(mut source: R, max_bytes: u64) -> Result<StagedUpload, IngestError> {
    let mut file = NamedTempFile::new()?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_LEN];
    let mut size: u64 = 0;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    let mut utf8 = Utf8Check::default();

    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        size += read as u64;
        if size > max_bytes {
            return Err(IngestError::FileTooLarge {
                size,
                limit: max_bytes,
            });
        }
        let bytes = &buffer[..read];
        hasher.update(bytes);
        utf8.update(bytes);
        let room = SNIFF_LEN - prefix.len();
        prefix.extend_from_slice(&bytes[..room.min(read)]);
        file.write_all(bytes)?;
    }
    file.flush()?;

    let encoding = resolve_encoding(&prefix, utf8.is_valid());
    tracing::debug!(encoding = encoding.name(), size, "resolved upload encoding");

    Ok(StagedUpload {
        file,
        size,
        content_hash: format!("{:x}", hasher.finalize()),
        encoding,
    })
}
