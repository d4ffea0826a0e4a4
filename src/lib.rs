// ATI Ingest - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod ingestion;
pub mod parser;
pub mod result;
pub mod store;
pub mod transformer;
pub mod validator;

// Re-export commonly used types
pub use config::{AppConfig, ServerConfig};
pub use db::{
    SqliteStore, Event,
    setup_database, insert_event, get_events_for_entity, ingestion_event, source_checksum,
    count_ati_requests, count_public_bodies, get_all_public_bodies,
};
pub use entities::{
    AtiRequest, AtiRequestPatch, NewAtiRequest, RequestOutcome, RequestStatus, RequestType,
    NewPublicBody, PublicBody, PublicBodyPatch,
};
pub use error::{IngestError, Result};
pub use ingestion::{IngestOptions, IngestSource, Ingestor, PublicBodyCache};
pub use parser::{CsvParser, ParseMetadata, ParsedRow, ParserOptions, RowChunks};
pub use result::{IngestionReport, IngestionResult, RecordError, Severity};
pub use store::{AtiRequestStore, IngestStore, PublicBodyStore, UnitOfWork};
pub use transformer::{Field, MappedRecord, RecordKind, Transformer};
pub use validator::{CleanAtiRequest, CleanPublicBody, CleanRecord, RecordValidator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
