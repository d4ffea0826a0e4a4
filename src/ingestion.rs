// 🚚 Ingestion Orchestrator - parse → transform → validate → resolve → persist
//
// One Ingestor run = one source file = one transaction. Row-level problems
// land on the IngestionResult; only storage failures abort the run.

use crate::entities::{NewAtiRequest, NewPublicBody, PublicBody};
use crate::error::{IngestError, Result};
use crate::parser::{CsvParser, ParsedRow, ParserOptions};
use crate::result::{IngestionResult, Severity};
use crate::store::IngestStore;
use crate::transformer::{RecordKind, Transformer};
use crate::validator::{CleanAtiRequest, CleanPublicBody, RecordValidator};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 1000;

const SOURCE_TYPE: &str = "csv";

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Treat every WARNING as an ERROR
    pub strict_mode: bool,
    /// Apply partial updates to duplicates instead of skipping them
    pub update_existing: bool,
    /// Staged creations per flush
    pub batch_size: usize,
    pub delimiter: Option<char>,
    pub encoding: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            strict_mode: false,
            update_existing: false,
            batch_size: DEFAULT_BATCH_SIZE,
            delimiter: None,
            encoding: None,
        }
    }
}

impl IngestOptions {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(IngestError::invalid_options(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }

        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() {
                return Err(IngestError::invalid_options(format!(
                    "delimiter must be a single ASCII character, got {:?}",
                    delimiter
                )));
            }
        }

        if let Some(encoding) = &self.encoding {
            if encoding.trim().is_empty() {
                return Err(IngestError::invalid_options("encoding must not be empty"));
            }
        }

        Ok(())
    }

    fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            delimiter: self.delimiter,
            encoding: self.encoding.clone(),
            ..ParserOptions::default()
        }
    }
}

// ============================================================================
// SOURCE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum IngestSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl IngestSource {
    /// Pick a source from optional parts; the path wins when both are given
    pub fn from_parts(path: Option<PathBuf>, bytes: Option<Vec<u8>>) -> Result<Self> {
        match (path, bytes) {
            (Some(path), _) => Ok(IngestSource::Path(path)),
            (None, Some(bytes)) => Ok(IngestSource::Bytes(bytes)),
            (None, None) => Err(IngestError::MissingSource),
        }
    }
}

// ============================================================================
// PUBLIC BODY CACHE
// ============================================================================

/// Lowercased name/abbreviation → id, scoped to one run
#[derive(Debug, Default)]
pub struct PublicBodyCache {
    ids: HashMap<String, Uuid>,
}

impl PublicBodyCache {
    pub fn seeded(bodies: &[PublicBody]) -> Self {
        let mut cache = PublicBodyCache::default();
        for body in bodies {
            cache.register(body);
        }
        cache
    }

    /// First registration of a key wins
    pub fn register(&mut self, body: &PublicBody) {
        for key in body.lookup_keys() {
            self.ids.entry(key).or_insert(body.id);
        }
    }

    pub fn get(&self, key: &str) -> Option<Uuid> {
        self.ids.get(&key.trim().to_lowercase()).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ============================================================================
// INGESTOR
// ============================================================================

/// Creations waiting for the next flush, keyed by natural key
struct Pending<T> {
    rows: Vec<(usize, T)>,
    keys: HashSet<String>,
}

impl<T> Pending<T> {
    fn new() -> Self {
        Pending {
            rows: Vec::new(),
            keys: HashSet::new(),
        }
    }

    fn push(&mut self, row_number: usize, key: String, fields: T) {
        self.keys.insert(key);
        self.rows.push((row_number, fields));
    }

    fn holds(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn drain(&mut self) -> Vec<(usize, T)> {
        self.keys.clear();
        std::mem::take(&mut self.rows)
    }
}

pub struct Ingestor<'a, S: IngestStore> {
    store: &'a S,
    options: IngestOptions,
}

impl<'a, S: IngestStore> Ingestor<'a, S> {
    pub fn new(store: &'a S, options: IngestOptions) -> Self {
        Ingestor { store, options }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Run one ingestion
    ///
    /// Only invalid options are returned as `Err`; every other failure is a
    /// CRITICAL finding on the returned result.
    pub fn ingest(
        &self,
        kind: RecordKind,
        source: IngestSource,
        filename: Option<&str>,
    ) -> Result<IngestionResult> {
        self.options.validate()?;

        let source_file = match (&source, filename) {
            (IngestSource::Path(path), _) => Some(path.display().to_string()),
            (IngestSource::Bytes(_), name) => name.map(str::to_string),
        };
        let mut result = IngestionResult::new(source_file, SOURCE_TYPE);

        tracing::info!(
            kind = kind.as_str(),
            file = result.source_file.as_deref().unwrap_or("upload"),
            "Starting ingestion"
        );

        let mut parser = CsvParser::new(self.options.parser_options());
        let parsed = match &source {
            IngestSource::Path(path) => parser.parse_file(path),
            IngestSource::Bytes(data) => parser.parse_bytes(data, filename.unwrap_or("upload.csv")),
        };

        let rows = match parsed {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "CSV parsing failed");
                result.add(0, None, format!("CSV parsing failed: {}", e), Severity::Critical);
                result.mark_complete();
                return Ok(result);
            }
        };
        result.total_records = rows.len();

        let outcome = self.store.begin().and_then(|_| match kind {
            RecordKind::AtiRequest => self.run_ati_requests(&rows, &mut result),
            RecordKind::PublicBody => self.run_public_bodies(&rows, &mut result),
        });

        let outcome = outcome.and_then(|_| self.store.commit());

        if let Err(e) = outcome {
            if let Err(rollback_error) = self.store.rollback() {
                tracing::error!(error = %rollback_error, "Rollback failed");
            }
            tracing::warn!(error = %e, "Ingestion rolled back");
            // Row counters keep their pre-rollback values; ids would point at nothing
            result.created_ids.clear();
            result.updated_ids.clear();
            result.add(0, None, format!("Ingestion failed: {:#}", e), Severity::Critical);
        }

        result.mark_complete();

        tracing::info!(
            total = result.total_records,
            successful = result.successful_records,
            failed = result.failed_records,
            skipped = result.skipped_records,
            created = result.created_count(),
            updated = result.updated_count(),
            "Ingestion finished"
        );

        Ok(result)
    }

    pub fn ingest_ati_requests(
        &self,
        source: IngestSource,
        filename: Option<&str>,
    ) -> Result<IngestionResult> {
        self.ingest(RecordKind::AtiRequest, source, filename)
    }

    pub fn ingest_public_bodies(
        &self,
        source: IngestSource,
        filename: Option<&str>,
    ) -> Result<IngestionResult> {
        self.ingest(RecordKind::PublicBody, source, filename)
    }

    // ------------------------------------------------------------------------
    // ATI requests
    // ------------------------------------------------------------------------

    fn run_ati_requests(&self, rows: &[ParsedRow], result: &mut IngestionResult) -> anyhow::Result<()> {
        let transformer = Transformer::new();
        let mut validator = RecordValidator::new(self.options.strict_mode);
        let mut cache = PublicBodyCache::seeded(&self.store.list_public_bodies()?);
        let mut pending: Pending<NewAtiRequest> = Pending::new();

        tracing::debug!(keys = cache.len(), "Public body cache loaded");

        for row in rows {
            let row_number = row.row_number;
            let record = transformer.transform_ati_request(row);

            let (is_valid, clean) = validator.validate_ati_request(&record);
            result.extend_findings(validator.take_findings());

            if !is_valid {
                result.failed_records += 1;
                continue;
            }

            let public_body_id = match self.resolve_public_body(&clean, &mut cache)? {
                Some(id) => id,
                None => {
                    let reference = clean
                        .public_body_name
                        .as_deref()
                        .or(clean.public_body_id.as_deref())
                        .unwrap_or_default();
                    result.add(
                        row_number,
                        Some("public_body"),
                        format!("Public body not found: {}", reference),
                        Severity::Error,
                    );
                    result.failed_records += 1;
                    continue;
                }
            };

            let fields = match clean.to_new(public_body_id) {
                Some(fields) => fields,
                None => {
                    result.add(row_number, None, "Record is missing required fields", Severity::Error);
                    result.failed_records += 1;
                    continue;
                }
            };
            let request_number = fields.request_number.clone();

            if pending.holds(&request_number) {
                self.flush_ati_requests(&mut pending, result)?;
            }

            if let Some(existing) = self.store.find_ati_request_by_number(&request_number)? {
                if self.options.update_existing {
                    match self.store.update_ati_request(&existing, &clean.to_patch()) {
                        Ok(updated) => {
                            result.successful_records += 1;
                            result.updated_ids.push(updated.id);
                        }
                        Err(e) => {
                            result.add(row_number, None, format!("Update failed: {:#}", e), Severity::Error);
                            result.failed_records += 1;
                        }
                    }
                } else {
                    result.add(
                        row_number,
                        Some("request_number"),
                        format!("Duplicate request number: {}", request_number),
                        Severity::Warning,
                    );
                    result.skipped_records += 1;
                }
                continue;
            }

            pending.push(row_number, request_number, fields);

            if pending.len() >= self.options.batch_size {
                self.flush_ati_requests(&mut pending, result)?;
            }
        }

        self.flush_ati_requests(&mut pending, result)
    }

    /// UUID first, then the run cache, then the store by name and abbreviation
    fn resolve_public_body(
        &self,
        clean: &CleanAtiRequest,
        cache: &mut PublicBodyCache,
    ) -> anyhow::Result<Option<Uuid>> {
        if let Some(id) = clean.public_body_id.as_deref().and_then(|raw| Uuid::parse_str(raw.trim()).ok()) {
            return Ok(Some(id));
        }

        let reference = match clean.public_body_name.as_deref().or(clean.public_body_id.as_deref()) {
            Some(reference) => reference,
            None => return Ok(None),
        };

        if let Some(id) = cache.get(reference) {
            return Ok(Some(id));
        }

        let found = match self.store.find_public_body_by_name(reference)? {
            Some(body) => Some(body),
            None => self.store.find_public_body_by_abbreviation(reference)?,
        };

        Ok(found.map(|body| {
            cache.register(&body);
            body.id
        }))
    }

    fn flush_ati_requests(
        &self,
        pending: &mut Pending<NewAtiRequest>,
        result: &mut IngestionResult,
    ) -> anyhow::Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let batch = pending.drain();
        tracing::debug!(rows = batch.len(), "Flushing ATI request batch");

        for (row_number, fields) in batch {
            match self.store.create_ati_request(fields) {
                Ok(created) => {
                    result.successful_records += 1;
                    result.created_ids.push(created.id);
                }
                Err(e) => {
                    result.add(row_number, None, format!("Creation failed: {:#}", e), Severity::Error);
                    result.failed_records += 1;
                }
            }
        }

        self.store.flush()
    }

    // ------------------------------------------------------------------------
    // Public bodies
    // ------------------------------------------------------------------------

    fn run_public_bodies(&self, rows: &[ParsedRow], result: &mut IngestionResult) -> anyhow::Result<()> {
        let transformer = Transformer::new();
        let mut validator = RecordValidator::new(self.options.strict_mode);
        let mut cache = PublicBodyCache::seeded(&self.store.list_public_bodies()?);
        let mut pending: Pending<NewPublicBody> = Pending::new();

        for row in rows {
            let row_number = row.row_number;
            let record = transformer.transform_public_body(row);

            let (is_valid, clean) = validator.validate_public_body(&record);
            result.extend_findings(validator.take_findings());

            if !is_valid {
                result.failed_records += 1;
                continue;
            }

            let fields = match clean.to_new() {
                Some(fields) => fields,
                None => {
                    result.add(row_number, Some("name"), "Name is required", Severity::Error);
                    result.failed_records += 1;
                    continue;
                }
            };
            let key = fields.name.to_lowercase();

            if pending.holds(&key) {
                self.flush_public_bodies(&mut pending, &mut cache, result)?;
            }

            let existing = if cache.contains(&fields.name) {
                self.store.find_public_body_by_name(&fields.name)?
            } else {
                None
            };

            if let Some(existing) = existing {
                self.apply_public_body_duplicate(row_number, &existing, &clean, result);
                continue;
            }

            pending.push(row_number, key, fields);

            if pending.len() >= self.options.batch_size {
                self.flush_public_bodies(&mut pending, &mut cache, result)?;
            }
        }

        self.flush_public_bodies(&mut pending, &mut cache, result)
    }

    fn apply_public_body_duplicate(
        &self,
        row_number: usize,
        existing: &PublicBody,
        clean: &CleanPublicBody,
        result: &mut IngestionResult,
    ) {
        if !self.options.update_existing {
            result.add(
                row_number,
                Some("name"),
                format!("Duplicate public body: {}", existing.name),
                Severity::Warning,
            );
            result.skipped_records += 1;
            return;
        }

        match self.store.update_public_body(existing, &clean.to_patch()) {
            Ok(updated) => {
                result.successful_records += 1;
                result.updated_ids.push(updated.id);
            }
            Err(e) => {
                result.add(row_number, None, format!("Update failed: {:#}", e), Severity::Error);
                result.failed_records += 1;
            }
        }
    }

    fn flush_public_bodies(
        &self,
        pending: &mut Pending<NewPublicBody>,
        cache: &mut PublicBodyCache,
        result: &mut IngestionResult,
    ) -> anyhow::Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let batch = pending.drain();
        tracing::debug!(rows = batch.len(), "Flushing public body batch");

        for (row_number, fields) in batch {
            match self.store.create_public_body(fields) {
                Ok(created) => {
                    cache.register(&created);
                    result.successful_records += 1;
                    result.created_ids.push(created.id);
                }
                Err(e) => {
                    result.add(row_number, None, format!("Creation failed: {:#}", e), Severity::Error);
                    result.failed_records += 1;
                }
            }
        }

        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_ati_requests, count_public_bodies, SqliteStore};
    use crate::entities::{RequestStatus, RequestType};
    use crate::entities::{AtiRequest, AtiRequestPatch, PublicBodyPatch};
    use crate::store::{AtiRequestStore, PublicBodyStore, UnitOfWork};
    use std::cell::Cell;
    use std::io::Write;

    /// SQLite store that breaks on a chosen request lookup or at commit
    struct FailingStore {
        inner: SqliteStore,
        fail_on_lookup: Option<usize>,
        fail_commit: bool,
        lookups: Cell<usize>,
    }

    impl FailingStore {
        fn new(inner: SqliteStore) -> Self {
            FailingStore {
                inner,
                fail_on_lookup: None,
                fail_commit: false,
                lookups: Cell::new(0),
            }
        }
    }

    impl PublicBodyStore for FailingStore {
        fn find_public_body_by_name(&self, name: &str) -> anyhow::Result<Option<PublicBody>> {
            self.inner.find_public_body_by_name(name)
        }

        fn find_public_body_by_abbreviation(&self, abbreviation: &str) -> anyhow::Result<Option<PublicBody>> {
            self.inner.find_public_body_by_abbreviation(abbreviation)
        }

        fn list_public_bodies(&self) -> anyhow::Result<Vec<PublicBody>> {
            self.inner.list_public_bodies()
        }

        fn create_public_body(&self, fields: NewPublicBody) -> anyhow::Result<PublicBody> {
            self.inner.create_public_body(fields)
        }

        fn update_public_body(&self, existing: &PublicBody, patch: &PublicBodyPatch) -> anyhow::Result<PublicBody> {
            self.inner.update_public_body(existing, patch)
        }
    }

    impl AtiRequestStore for FailingStore {
        fn find_ati_request_by_number(&self, request_number: &str) -> anyhow::Result<Option<AtiRequest>> {
            let call = self.lookups.get() + 1;
            self.lookups.set(call);
            if self.fail_on_lookup == Some(call) {
                anyhow::bail!("db gone");
            }
            self.inner.find_ati_request_by_number(request_number)
        }

        fn create_ati_request(&self, fields: NewAtiRequest) -> anyhow::Result<AtiRequest> {
            self.inner.create_ati_request(fields)
        }

        fn update_ati_request(&self, existing: &AtiRequest, patch: &AtiRequestPatch) -> anyhow::Result<AtiRequest> {
            self.inner.update_ati_request(existing, patch)
        }
    }

    impl UnitOfWork for FailingStore {
        fn begin(&self) -> anyhow::Result<()> {
            self.inner.begin()
        }

        fn flush(&self) -> anyhow::Result<()> {
            self.inner.flush()
        }

        fn commit(&self) -> anyhow::Result<()> {
            if self.fail_commit {
                anyhow::bail!("disk full");
            }
            self.inner.commit()
        }

        fn rollback(&self) -> anyhow::Result<()> {
            self.inner.rollback()
        }
    }

    fn store_with_bodies(names: &[(&str, Option<&str>)]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for (name, abbreviation) in names {
            store
                .create_public_body(NewPublicBody {
                    abbreviation: abbreviation.map(str::to_string),
                    ..NewPublicBody::named(name)
                })
                .unwrap();
        }
        store
    }

    fn bytes(csv: &str) -> IngestSource {
        IngestSource::Bytes(csv.as_bytes().to_vec())
    }

    const REQUESTS_CSV: &str = "request_number,submission_date,due_date,public_body_name,status\n\
        ATI-001,2024-01-15,2024-02-14,Treasury Board,new\n\
        ATI-002,2024-01-20,,TBS,in progress\n\
        ATI-003,2024-01-22,2024-02-21,treasury board,closed\n";

    #[test]
    fn test_ingest_ati_requests() {
        let store = store_with_bodies(&[("Treasury Board", Some("TBS"))]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let result = ingestor
            .ingest_ati_requests(bytes(REQUESTS_CSV), Some("requests.csv"))
            .unwrap();

        assert_eq!(result.total_records, 3);
        assert_eq!(result.successful_records, 3);
        assert_eq!(result.created_count(), 3);
        assert!(result.is_successful());
        assert!(result.is_complete());
        assert_eq!(result.source_file.as_deref(), Some("requests.csv"));

        let first = store.find_ati_request_by_number("ATI-001").unwrap().unwrap();
        assert_eq!(first.status, RequestStatus::Received);
        assert_eq!(first.request_type, RequestType::NonPersonal);

        let second = store.find_ati_request_by_number("ATI-002").unwrap().unwrap();
        assert_eq!(second.status, RequestStatus::InProgress);
        assert_eq!(second.due_date.to_string(), "2024-02-19");

        let third = store.find_ati_request_by_number("ATI-003").unwrap().unwrap();
        assert_eq!(third.status, RequestStatus::Completed);
        assert_eq!(count_ati_requests(store.connection()).unwrap(), 3);
    }

    #[test]
    fn test_unknown_public_body_fails_row() {
        let store = store_with_bodies(&[("Treasury Board", Some("TBS"))]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let csv = "request_number,submission_date,due_date,public_body_name\n\
            ATI-001,2024-01-15,2024-02-14,Unknown Agency\n";
        let result = ingestor.ingest_ati_requests(bytes(csv), None).unwrap();

        assert_eq!(result.failed_records, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].refers_to("public_body"));
        assert_eq!(result.errors[0].error_message, "Public body not found: Unknown Agency");
        assert!(result.is_successful());
        assert_eq!(count_ati_requests(store.connection()).unwrap(), 0);
    }

    #[test]
    fn test_public_body_resolved_by_uuid() {
        let store = SqliteStore::open_in_memory().unwrap();
        let body = store.create_public_body(NewPublicBody::named("Health Canada")).unwrap();
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let csv = format!(
            "request_number,submission_date,due_date,public_body_id\nHC-1,2024-03-01,2024-03-31,{}\n",
            body.id
        );
        let result = ingestor.ingest_ati_requests(bytes(&csv), None).unwrap();

        assert_eq!(result.successful_records, 1);
        let request = store.find_ati_request_by_number("HC-1").unwrap().unwrap();
        assert_eq!(request.public_body_id, body.id);
    }

    #[test]
    fn test_invalid_status_defaults_with_warning() {
        let store = store_with_bodies(&[("Treasury Board", None)]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let csv = "request_number,submission_date,due_date,public_body_name,status\n\
            ATI-001,2024-01-15,2024-02-14,Treasury Board,invalid_status_value\n";
        let result = ingestor.ingest_ati_requests(bytes(csv), None).unwrap();

        assert_eq!(result.successful_records, 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].refers_to("status"));

        let request = store.find_ati_request_by_number("ATI-001").unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Received);
    }

    #[test]
    fn test_strict_mode_rejects_repaired_rows() {
        let store = store_with_bodies(&[("Treasury Board", None)]);
        let options = IngestOptions {
            strict_mode: true,
            ..IngestOptions::default()
        };
        let ingestor = Ingestor::new(&store, options);

        let csv = "request_number,submission_date,due_date,public_body_name,status\n\
            ATI-001,2024-01-15,2024-02-14,Treasury Board,invalid_status_value\n";
        let result = ingestor.ingest_ati_requests(bytes(csv), None).unwrap();

        assert_eq!(result.failed_records, 1);
        assert!(result.warnings.is_empty());
        assert_eq!(result.errors[0].severity, Severity::Error);
        assert_eq!(count_ati_requests(store.connection()).unwrap(), 0);
    }

    #[test]
    fn test_second_run_skips_duplicates() {
        let store = store_with_bodies(&[("Treasury Board", Some("TBS"))]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let first = ingestor.ingest_ati_requests(bytes(REQUESTS_CSV), None).unwrap();
        let second = ingestor.ingest_ati_requests(bytes(REQUESTS_CSV), None).unwrap();

        assert_eq!(first.created_count(), 3);
        assert_eq!(second.created_count(), 0);
        assert_eq!(second.skipped_records, 3);
        assert_eq!(second.warnings.len(), 3);
        assert!(second.warnings[0].error_message.starts_with("Duplicate request number"));
        assert_eq!(count_ati_requests(store.connection()).unwrap(), 3);
    }

    #[test]
    fn test_update_existing_is_partial() {
        let store = store_with_bodies(&[("Treasury Board", None)]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let csv = "request_number,submission_date,due_date,public_body_name,pages_processed,summary\n\
            ATI-001,2024-01-15,2024-02-14,Treasury Board,40,Contracts for 2023\n";
        ingestor.ingest_ati_requests(bytes(csv), None).unwrap();

        let updating = Ingestor::new(
            &store,
            IngestOptions {
                update_existing: true,
                ..IngestOptions::default()
            },
        );
        let csv = "request_number,submission_date,due_date,public_body_name,status,completion_date\n\
            ATI-001,2024-01-15,2024-02-14,Treasury Board,completed,2024-02-10\n";
        let result = updating.ingest_ati_requests(bytes(csv), None).unwrap();

        assert_eq!(result.successful_records, 1);
        assert_eq!(result.updated_count(), 1);
        assert_eq!(result.created_count(), 0);

        let request = store.find_ati_request_by_number("ATI-001").unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Completed);
        assert_eq!(request.completion_date.map(|d| d.to_string()).as_deref(), Some("2024-02-10"));
        // Absent columns leave stored values alone
        assert_eq!(request.pages_processed, Some(40));
        assert_eq!(request.summary.as_deref(), Some("Contracts for 2023"));
    }

    #[test]
    fn test_duplicate_within_file_resolves_against_first_row() {
        let store = store_with_bodies(&[("Treasury Board", None)]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let csv = "request_number,submission_date,due_date,public_body_name\n\
            ATI-001,2024-01-15,2024-02-14,Treasury Board\n\
            ATI-001,2024-01-16,2024-02-15,Treasury Board\n";
        let result = ingestor.ingest_ati_requests(bytes(csv), None).unwrap();

        assert_eq!(result.created_count(), 1);
        assert_eq!(result.skipped_records, 1);
        assert_eq!(result.warnings[0].row_number, 3);
        assert!(result.errors.is_empty());

        let request = store.find_ati_request_by_number("ATI-001").unwrap().unwrap();
        assert_eq!(request.submission_date.to_string(), "2024-01-15");
    }

    #[test]
    fn test_row_numbers_and_counts() {
        let store = store_with_bodies(&[("Treasury Board", None)]);
        let options = IngestOptions {
            batch_size: 1,
            ..IngestOptions::default()
        };
        let ingestor = Ingestor::new(&store, options);

        let csv = "request_number,submission_date,due_date,public_body_name\n\
            ATI-001,2024-01-15,2024-02-14,Treasury Board\n\
            ,2024-01-15,2024-02-14,Treasury Board\n\
            ATI-003,2024-01-15,2024-01-01,Treasury Board\n\
            ATI-004,2024-01-15,2024-02-14,Treasury Board\n";
        let result = ingestor.ingest_ati_requests(bytes(csv), None).unwrap();

        assert_eq!(result.total_records, 4);
        assert_eq!(result.successful_records, 2);
        assert_eq!(result.failed_records, 2);

        let rows: Vec<usize> = result.errors.iter().map(|e| e.row_number).collect();
        assert_eq!(rows, vec![3, 4]);
        assert!(result.errors[1].refers_to("due_date"));
    }

    #[test]
    fn test_lookup_failure_rolls_back_flushed_rows() {
        let mut store = FailingStore::new(store_with_bodies(&[("Treasury Board", Some("TBS"))]));
        store.fail_on_lookup = Some(3);
        let options = IngestOptions {
            batch_size: 1,
            ..IngestOptions::default()
        };
        let ingestor = Ingestor::new(&store, options);

        let result = ingestor.ingest_ati_requests(bytes(REQUESTS_CSV), None).unwrap();

        assert!(!result.is_successful());
        assert!(result.is_complete());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].severity, Severity::Critical);
        assert_eq!(result.errors[0].row_number, 0);
        assert_eq!(result.errors[0].error_message, "Ingestion failed: db gone");
        assert_eq!(result.created_count(), 0);
        assert_eq!(count_ati_requests(store.inner.connection()).unwrap(), 0);
    }

    #[test]
    fn test_commit_failure_rolls_back_everything() {
        let mut store = FailingStore::new(store_with_bodies(&[("Treasury Board", Some("TBS"))]));
        store.fail_commit = true;
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let result = ingestor.ingest_ati_requests(bytes(REQUESTS_CSV), None).unwrap();

        assert!(!result.is_successful());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].severity, Severity::Critical);
        assert_eq!(result.errors[0].error_message, "Ingestion failed: disk full");
        assert_eq!(result.created_count(), 0);
        assert_eq!(count_ati_requests(store.inner.connection()).unwrap(), 0);

        // The connection is usable again once the failed run is rolled back
        store.fail_commit = false;
        let retry = Ingestor::new(&store, IngestOptions::default())
            .ingest_ati_requests(bytes(REQUESTS_CSV), None)
            .unwrap();
        assert!(retry.is_successful());
        assert_eq!(count_ati_requests(store.inner.connection()).unwrap(), 3);
    }

    #[test]
    fn test_parse_failure_is_critical() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let result = ingestor
            .ingest_ati_requests(IngestSource::Path(PathBuf::from("/no/such/requests.csv")), None)
            .unwrap();

        assert!(!result.is_successful());
        assert_eq!(result.total_records, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].row_number, 0);
        assert!(result.errors[0].error_message.starts_with("CSV parsing failed: File not found"));
        assert!(result.is_complete());
    }

    #[test]
    fn test_ingest_from_path_records_source_file() {
        let store = store_with_bodies(&[("Treasury Board", Some("TBS"))]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(REQUESTS_CSV.as_bytes()).unwrap();

        let result = ingestor
            .ingest_ati_requests(IngestSource::Path(file.path().to_path_buf()), Some("ignored.csv"))
            .unwrap();

        assert_eq!(result.created_count(), 3);
        assert_eq!(result.source_file, Some(file.path().display().to_string()));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let options = IngestOptions {
            batch_size: 0,
            ..IngestOptions::default()
        };
        let ingestor = Ingestor::new(&store, options);

        let err = ingestor.ingest_ati_requests(bytes(REQUESTS_CSV), None).unwrap_err();
        assert!(matches!(err, IngestError::InvalidOptions { .. }));

        let too_big = IngestOptions {
            batch_size: MAX_BATCH_SIZE + 1,
            ..IngestOptions::default()
        };
        assert!(too_big.validate().is_err());

        let bad_delimiter = IngestOptions {
            delimiter: Some('§'),
            ..IngestOptions::default()
        };
        assert!(bad_delimiter.validate().is_err());
    }

    #[test]
    fn test_source_from_parts() {
        assert!(matches!(
            IngestSource::from_parts(None, None),
            Err(IngestError::MissingSource)
        ));
        assert_eq!(
            IngestSource::from_parts(None, Some(b"a,b".to_vec())).unwrap(),
            IngestSource::Bytes(b"a,b".to_vec())
        );
        assert_eq!(
            IngestSource::from_parts(Some(PathBuf::from("x.csv")), Some(Vec::new())).unwrap(),
            IngestSource::Path(PathBuf::from("x.csv"))
        );
    }

    #[test]
    fn test_ingest_public_bodies() {
        let store = store_with_bodies(&[("Health Canada", Some("HC"))]);
        let ingestor = Ingestor::new(&store, IngestOptions::default());

        let csv = "organization_name,acronym,ati_email,url\n\
            Treasury Board Secretariat,TBS,ATIP@tbs-sct.gc.ca,www.tbs-sct.gc.ca\n\
            health canada,HC,,\n\
            Treasury Board Secretariat,TBS,,\n";
        let result = ingestor.ingest_public_bodies(bytes(csv), None).unwrap();

        assert_eq!(result.total_records, 3);
        assert_eq!(result.created_count(), 1);
        assert_eq!(result.skipped_records, 2);
        assert_eq!(count_public_bodies(store.connection()).unwrap(), 2);

        let tbs = store.find_public_body_by_abbreviation("tbs").unwrap().unwrap();
        assert_eq!(tbs.contact_email.as_deref(), Some("atip@tbs-sct.gc.ca"));
        assert_eq!(tbs.website_url.as_deref(), Some("https://www.tbs-sct.gc.ca"));
    }

    #[test]
    fn test_public_body_update_existing() {
        let store = store_with_bodies(&[("Health Canada", None)]);
        let ingestor = Ingestor::new(
            &store,
            IngestOptions {
                update_existing: true,
                ..IngestOptions::default()
            },
        );

        let csv = "name,abbreviation,description\nHealth Canada,HC,Federal health department\n";
        let result = ingestor.ingest_public_bodies(bytes(csv), None).unwrap();

        assert_eq!(result.updated_count(), 1);
        let body = store.find_public_body_by_name("health canada").unwrap().unwrap();
        assert_eq!(body.abbreviation.as_deref(), Some("HC"));
        assert_eq!(body.description.as_deref(), Some("Federal health department"));
    }

    #[test]
    fn test_cache_keys_are_case_insensitive() {
        let body = PublicBody::new(NewPublicBody {
            abbreviation: Some("TBS".to_string()),
            ..NewPublicBody::named("Treasury Board")
        });
        let cache = PublicBodyCache::seeded(&[body.clone()]);

        assert_eq!(cache.get("TREASURY BOARD"), Some(body.id));
        assert_eq!(cache.get(" tbs "), Some(body.id));
        assert!(!cache.contains("Health Canada"));
        assert_eq!(cache.len(), 2);
    }
}
