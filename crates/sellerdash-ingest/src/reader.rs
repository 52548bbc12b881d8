//! Bounded-memory CSV streaming with encoding detection.
//!
//! The reader picks an encoding (sniffed from the leading bytes, or decided
//! by the caller after a full pass over the file), transcodes the stream to
//! UTF-8 incrementally, validates the header row against a
//! [`SchemaDescriptor`], and yields rows in chunks of at most `chunk_size`.

use std::collections::BTreeMap;
use std::io::{self, Chain, Cursor, Read};

use encoding_rs::{DecoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use sellerdash_core::SchemaDescriptor;

use crate::error::ReadError;

/// Bytes inspected for encoding detection.
pub const SNIFF_LEN: usize = 64 * 1024;

const INPUT_BUFFER_LEN: usize = 16 * 1024;
const OUTPUT_BUFFER_LEN: usize = 32 * 1024;

/// One CSV data row, keyed by trimmed header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based data-row index within the file (header excluded).
    pub row_index: usize,
    pub cells: BTreeMap<String, String>,
}

impl RawRow {
    /// The cell for `column`, or the empty string when the row is short.
    #[must_use]
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map_or("", String::as_str)
    }
}

/// A bounded batch of rows processed as one transactional unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChunk {
    /// 0-based position of the chunk within the file.
    pub index: usize,
    pub rows: Vec<RawRow>,
}

// ---------------------------------------------------------------------------
// Encoding detection and transcoding
// ---------------------------------------------------------------------------

/// Pick an encoding for `prefix`, the leading bytes of a file.
///
/// A BOM wins; otherwise NUL bytes select UTF-16 with the byte order
/// implied by where they fall; otherwise valid UTF-8 (a multi-byte sequence
/// cut off at the end of the prefix still counts) selects UTF-8; otherwise
/// Windows-1252.
#[must_use]
pub fn detect_encoding(prefix: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(prefix) {
        return encoding;
    }

    let (even_nuls, odd_nuls) = prefix
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == 0)
        .fold((0usize, 0usize), |(even, odd), (i, _)| {
            if i % 2 == 0 {
                (even + 1, odd)
            } else {
                (even, odd + 1)
            }
        });
    if odd_nuls > even_nuls {
        return UTF_16LE;
    }
    if even_nuls > 0 {
        return UTF_16BE;
    }

    match std::str::from_utf8(prefix) {
        Ok(_) => UTF_8,
        Err(e) if e.error_len().is_none() => UTF_8,
        Err(_) => WINDOWS_1252,
    }
}

/// Pick the encoding of a whole file from its leading bytes and whether the
/// entire file decodes as UTF-8.
///
/// Identical to [`detect_encoding`] except that a BOM-less file the prefix
/// alone would call UTF-8 falls back to Windows-1252 when an invalid
/// sequence appears anywhere later in the file.
#[must_use]
pub fn resolve_encoding(prefix: &[u8], whole_file_is_utf8: bool) -> &'static Encoding {
    let sniffed = detect_encoding(prefix);
    if sniffed == UTF_8 && !whole_file_is_utf8 && Encoding::for_bom(prefix).is_none() {
        WINDOWS_1252
    } else {
        sniffed
    }
}

/// Adapts a byte stream in any supported encoding into a UTF-8 byte stream.
///
/// A leading BOM is stripped. Malformed input surfaces as an
/// [`io::ErrorKind::InvalidData`] error.
pub struct TranscodingReader<R> {
    inner: R,
    encoding: &'static Encoding,
    decoder: encoding_rs::Decoder,
    input: Vec<u8>,
    input_start: usize,
    input_end: usize,
    output: Vec<u8>,
    output_start: usize,
    output_end: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> TranscodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            decoder: encoding.new_decoder_with_bom_removal(),
            input: vec![0; INPUT_BUFFER_LEN],
            input_start: 0,
            input_end: 0,
            output: vec![0; OUTPUT_BUFFER_LEN],
            output_start: 0,
            output_end: 0,
            eof: false,
            finished: false,
        }
    }

    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

impl<R: Read> Read for TranscodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.output_start < self.output_end {
                let n = buf.len().min(self.output_end - self.output_start);
                buf[..n].copy_from_slice(&self.output[self.output_start..self.output_start + n]);
                self.output_start += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }

            if self.input_start == self.input_end && !self.eof {
                self.input_start = 0;
                self.input_end = self.inner.read(&mut self.input)?;
                if self.input_end == 0 {
                    self.eof = true;
                }
            }

            let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
                &self.input[self.input_start..self.input_end],
                &mut self.output,
                self.eof,
            );
            self.input_start += read;
            self.output_start = 0;
            self.output_end = written;

            match result {
                DecoderResult::InputEmpty => {
                    if self.eof {
                        self.finished = true;
                    }
                }
                DecoderResult::OutputFull => {}
                DecoderResult::Malformed(_, _) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("malformed {} byte sequence", self.encoding.name()),
                    ));
                }
            }
        }
    }
}

type Source<R> = TranscodingReader<Chain<Cursor<Vec<u8>>, R>>;

/// Sniff the encoding of `source` and wrap it in a transcoding reader.
///
/// # Errors
///
/// Returns [`ReadError::Io`] if the leading bytes cannot be read.
pub fn open_transcoded<R: Read>(mut source: R) -> Result<Source<R>, ReadError> {
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    (&mut source)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut prefix)?;
    let encoding = detect_encoding(&prefix);
    tracing::debug!(encoding = encoding.name(), sniffed = prefix.len(), "detected upload encoding");
    Ok(TranscodingReader::new(
        Cursor::new(prefix).chain(source),
        encoding,
    ))
}

fn open_as<R: Read>(source: R, encoding: &'static Encoding) -> Source<R> {
    TranscodingReader::new(Cursor::new(Vec::new()).chain(source), encoding)
}

fn map_csv_error(err: csv::Error, encoding: &'static Encoding) -> ReadError {
    let reason = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) if e.kind() == io::ErrorKind::InvalidData => ReadError::Encoding {
            encoding: encoding.name(),
            reason: e.to_string(),
        },
        csv::ErrorKind::Io(e) => ReadError::Io(e),
        csv::ErrorKind::Utf8 { .. } => ReadError::Encoding {
            encoding: encoding.name(),
            reason,
        },
        _ => ReadError::Malformed(reason),
    }
}

fn csv_reader<R: Read>(source: Source<R>) -> csv::Reader<Source<R>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(source)
}

// ---------------------------------------------------------------------------
// Header validation
// ---------------------------------------------------------------------------

/// Check `found` against the descriptor's template.
///
/// Order-insensitive descriptors only need every required column present;
/// order-significant ones need the header to list exactly the template
/// columns in template order.
///
/// # Errors
///
/// Returns [`ReadError::HeaderMismatch`] describing the difference.
pub fn validate_header(descriptor: &SchemaDescriptor, found: &[String]) -> Result<(), ReadError> {
    let expected: Vec<String> = descriptor
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let missing: Vec<String> = descriptor
        .required_columns()
        .filter(|c| !found.iter().any(|f| f == c.name))
        .map(|c| c.name.to_string())
        .collect();

    let order_ok = !descriptor.order_significant || found == expected.as_slice();
    if missing.is_empty() && order_ok {
        return Ok(());
    }
    Err(ReadError::HeaderMismatch {
        report_type: descriptor.report_type,
        missing,
        expected,
        found: found.to_vec(),
    })
}

// ---------------------------------------------------------------------------
// Chunked reading
// ---------------------------------------------------------------------------

/// Lazy iterator of [`RowChunk`]s. Yields [`ReadError::EmptyFile`] once if
/// the file has a header but no data rows.
pub struct ChunkReader<R: Read> {
    reader: csv::Reader<Source<R>>,
    encoding: &'static Encoding,
    headers: Vec<String>,
    record: csv::StringRecord,
    chunk_size: usize,
    next_chunk: usize,
    rows_read: usize,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    fn next_row(&mut self) -> Result<Option<RawRow>, ReadError> {
        let more = self
            .reader
            .read_record(&mut self.record)
            .map_err(|e| map_csv_error(e, self.encoding))?;
        if !more {
            return Ok(None);
        }
        self.rows_read += 1;
        let cells = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), self.record.get(i).unwrap_or("").to_string()))
            .collect();
        Ok(Some(RawRow {
            row_index: self.rows_read,
            cells,
        }))
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<RowChunk, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut rows = Vec::with_capacity(self.chunk_size.min(1024));
        while rows.len() < self.chunk_size {
            match self.next_row() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if rows.is_empty() {
            self.done = true;
            return (self.rows_read == 0).then_some(Err(ReadError::EmptyFile));
        }

        let index = self.next_chunk;
        self.next_chunk += 1;
        Some(Ok(RowChunk { index, rows }))
    }
}

fn read_headers<R: Read>(
    reader: &mut csv::Reader<Source<R>>,
    encoding: &'static Encoding,
) -> Result<Vec<String>, ReadError> {
    let headers = reader
        .headers()
        .map_err(|e| map_csv_error(e, encoding))?;
    let headers: Vec<String> = headers.iter().map(str::to_string).collect();
    if headers.iter().all(String::is_empty) {
        return Err(ReadError::EmptyFile);
    }
    Ok(headers)
}

/// Open `source` for chunked reading under `descriptor`, sniffing its
/// encoding from the first [`SNIFF_LEN`] bytes.
///
/// The header is read and validated eagerly; data rows are read lazily.
///
/// # Errors
///
/// Returns [`ReadError::EmptyFile`] if there is no header,
/// [`ReadError::HeaderMismatch`] if it does not fit the template, or
/// [`ReadError::Encoding`] / [`ReadError::Io`] on decode and I/O failures.
pub fn read_chunks<R: Read>(
    source: R,
    descriptor: &SchemaDescriptor,
    chunk_size: usize,
) -> Result<ChunkReader<R>, ReadError> {
    chunk_reader(open_transcoded(source)?, descriptor, chunk_size)
}

/// [`read_chunks`] with an encoding already decided by the caller, for
/// example by [`resolve_encoding`] after a full pass over a staged file.
///
/// # Errors
///
/// As [`read_chunks`].
pub fn read_chunks_as<R: Read>(
    source: R,
    encoding: &'static Encoding,
    descriptor: &SchemaDescriptor,
    chunk_size: usize,
) -> Result<ChunkReader<R>, ReadError> {
    chunk_reader(open_as(source, encoding), descriptor, chunk_size)
}

fn chunk_reader<R: Read>(
    transcoded: Source<R>,
    descriptor: &SchemaDescriptor,
    chunk_size: usize,
) -> Result<ChunkReader<R>, ReadError> {
    let encoding = transcoded.encoding();
    let mut reader = csv_reader(transcoded);
    let headers = read_headers(&mut reader, encoding)?;
    validate_header(descriptor, &headers)?;

    Ok(ChunkReader {
        reader,
        encoding,
        headers,
        record: csv::StringRecord::new(),
        chunk_size: chunk_size.max(1),
        next_chunk: 0,
        rows_read: 0,
        done: false,
    })
}

/// Count the data rows of `source` in one streaming pass, sniffing its
/// encoding.
///
/// # Errors
///
/// Returns [`ReadError::EmptyFile`] if there is no header, or a decode/I/O
/// error from the underlying stream.
pub fn count_rows<R: Read>(source: R) -> Result<u64, ReadError> {
    count_transcoded(open_transcoded(source)?)
}

/// [`count_rows`] with an encoding already decided by the caller.
///
/// # Errors
///
/// As [`count_rows`].
pub fn count_rows_as<R: Read>(source: R, encoding: &'static Encoding) -> Result<u64, ReadError> {
    count_transcoded(open_as(source, encoding))
}

fn count_transcoded<R: Read>(transcoded: Source<R>) -> Result<u64, ReadError> {
    let encoding = transcoded.encoding();
    let mut reader = csv_reader(transcoded);
    read_headers(&mut reader, encoding)?;

    let mut record = csv::ByteRecord::new();
    let mut count = 0u64;
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| map_csv_error(e, encoding))?
    {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
#[path = "reader_test.rs"]
mod tests;
