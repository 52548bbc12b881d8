//! Chunked CSV ingestion for seller reports.
//!
//! The pipeline for one upload is reader → validator → upserter, driven by
//! the [`IngestCoordinator`]. Persistence goes through the [`ReportStore`]
//! and [`StoreAccess`] traits, with Postgres and in-memory adapters in
//! [`store`].

pub mod coordinator;
pub mod error;
pub mod progress;
pub mod reader;
pub mod staging;
pub mod store;
pub mod upserter;
pub mod validator;

pub use coordinator::{IngestCoordinator, IngestSettings, UploadOutcome, DEFAULT_ERROR_DIGEST_LIMIT};
pub use error::{AccessError, IngestError, ReadError, RowError, RowErrorKind, StoreError};
pub use progress::{progress_percent, UploadProgress};
pub use reader::{
    count_rows, count_rows_as, detect_encoding, read_chunks, read_chunks_as, resolve_encoding,
    ChunkReader, RawRow, RowChunk,
};
pub use staging::{sanitize_filename, stage, SanitizedFilename, StagedUpload};
pub use store::{
    MemoryReportStore, PgReportStore, PgStoreAccess, ReportStore, ReportTx, StaticStoreAccess,
    StoreAccess, UpsertedRow, MAX_HISTORY_LIMIT,
};
pub use upserter::{upsert_chunk, UpsertOutcome};
pub use validator::{validate_chunk, ValidatedChunk};
