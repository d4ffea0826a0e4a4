use crate::entities::{
    AtiRequest, AtiRequestPatch, NewAtiRequest, NewPublicBody, PublicBody, PublicBodyPatch,
    RequestOutcome, RequestStatus, RequestType,
};
use crate::result::IngestionResult;
use crate::store::{AtiRequestStore, PublicBodyStore, UnitOfWork};
use crate::transformer::RecordKind;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

const PUBLIC_BODY_COLUMNS: &str = "id, name, abbreviation, description, contact_email, website_url,
     is_active, created_at, updated_at";

const ATI_REQUEST_COLUMNS: &str = "id, request_number, public_body_id, submission_date, due_date,
     completion_date, extension_days, request_type, status, outcome, pages_processed,
     pages_disclosed, fees_charged, is_deemed_refusal, summary, created_at, updated_at";

/// Event for audit trail (one row per ingestion run)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    // ==========================================================================
    // Public Bodies Table (natural key: name, case-insensitive)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS public_bodies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            abbreviation TEXT,
            description TEXT,
            contact_email TEXT,
            website_url TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // ATI Requests Table (natural key: request_number)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ati_requests (
            id TEXT PRIMARY KEY,
            request_number TEXT NOT NULL UNIQUE,
            public_body_id TEXT NOT NULL REFERENCES public_bodies(id),
            submission_date TEXT NOT NULL,
            due_date TEXT NOT NULL,
            completion_date TEXT,
            extension_days INTEGER NOT NULL DEFAULT 0,
            request_type TEXT NOT NULL,
            status TEXT NOT NULL,
            outcome TEXT NOT NULL,
            pages_processed INTEGER,
            pages_disclosed INTEGER,
            fees_charged REAL,
            is_deemed_refusal INTEGER NOT NULL DEFAULT 0,
            summary TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_public_bodies_abbreviation
         ON public_bodies(abbreviation COLLATE NOCASE)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ati_requests_public_body ON ati_requests(public_body_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ati_requests_status ON ati_requests(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed persistence collaborator
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to set up database schema")?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl PublicBodyStore for SqliteStore {
    fn find_public_body_by_name(&self, name: &str) -> Result<Option<PublicBody>> {
        let sql = format!(
            "SELECT {} FROM public_bodies WHERE name = ?1 COLLATE NOCASE",
            PUBLIC_BODY_COLUMNS
        );
        let body = self
            .conn
            .query_row(&sql, params![name.trim()], public_body_from_row)
            .optional()
            .with_context(|| format!("Failed to look up public body {}", name))?;

        Ok(body)
    }

    fn find_public_body_by_abbreviation(&self, abbreviation: &str) -> Result<Option<PublicBody>> {
        let sql = format!(
            "SELECT {} FROM public_bodies WHERE abbreviation = ?1 COLLATE NOCASE
             ORDER BY created_at LIMIT 1",
            PUBLIC_BODY_COLUMNS
        );
        let body = self
            .conn
            .query_row(&sql, params![abbreviation.trim()], public_body_from_row)
            .optional()
            .with_context(|| format!("Failed to look up abbreviation {}", abbreviation))?;

        Ok(body)
    }

    fn list_public_bodies(&self) -> Result<Vec<PublicBody>> {
        get_all_public_bodies(&self.conn)
    }

    fn create_public_body(&self, fields: NewPublicBody) -> Result<PublicBody> {
        let body = PublicBody::new(fields);

        self.conn
            .execute(
                "INSERT INTO public_bodies (
                    id, name, abbreviation, description, contact_email, website_url,
                    is_active, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    body.id.to_string(),
                    body.name,
                    body.abbreviation,
                    body.description,
                    body.contact_email,
                    body.website_url,
                    body.is_active,
                    body.created_at.to_rfc3339(),
                    body.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("Failed to insert public body {}", body.name))?;

        Ok(body)
    }

    fn update_public_body(&self, existing: &PublicBody, patch: &PublicBodyPatch) -> Result<PublicBody> {
        let mut body = existing.clone();
        body.apply_patch(patch);

        self.conn
            .execute(
                "UPDATE public_bodies
                 SET abbreviation = ?1, description = ?2, contact_email = ?3,
                     website_url = ?4, is_active = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    body.abbreviation,
                    body.description,
                    body.contact_email,
                    body.website_url,
                    body.is_active,
                    body.updated_at.to_rfc3339(),
                    body.id.to_string(),
                ],
            )
            .with_context(|| format!("Failed to update public body {}", body.name))?;

        Ok(body)
    }
}

impl AtiRequestStore for SqliteStore {
    fn find_ati_request_by_number(&self, request_number: &str) -> Result<Option<AtiRequest>> {
        let sql = format!(
            "SELECT {} FROM ati_requests WHERE request_number = ?1",
            ATI_REQUEST_COLUMNS
        );
        let request = self
            .conn
            .query_row(&sql, params![request_number], ati_request_from_row)
            .optional()
            .with_context(|| format!("Failed to look up request {}", request_number))?;

        Ok(request)
    }

    fn create_ati_request(&self, fields: NewAtiRequest) -> Result<AtiRequest> {
        let request = AtiRequest::new(fields);

        self.conn
            .execute(
                "INSERT INTO ati_requests (
                    id, request_number, public_body_id, submission_date, due_date,
                    completion_date, extension_days, request_type, status, outcome,
                    pages_processed, pages_disclosed, fees_charged, is_deemed_refusal,
                    summary, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    request.id.to_string(),
                    request.request_number,
                    request.public_body_id.to_string(),
                    request.submission_date.format(DATE_FORMAT).to_string(),
                    request.due_date.format(DATE_FORMAT).to_string(),
                    request.completion_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    request.extension_days,
                    request.request_type.as_str(),
                    request.status.as_str(),
                    request.outcome.as_str(),
                    request.pages_processed,
                    request.pages_disclosed,
                    request.fees_charged,
                    request.is_deemed_refusal,
                    request.summary,
                    request.created_at.to_rfc3339(),
                    request.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("Failed to insert request {}", request.request_number))?;

        Ok(request)
    }

    fn update_ati_request(&self, existing: &AtiRequest, patch: &AtiRequestPatch) -> Result<AtiRequest> {
        let mut request = existing.clone();
        request.apply_patch(patch);

        self.conn
            .execute(
                "UPDATE ati_requests
                 SET status = ?1, outcome = ?2, completion_date = ?3, extension_days = ?4,
                     pages_processed = ?5, pages_disclosed = ?6, fees_charged = ?7,
                     is_deemed_refusal = ?8, summary = ?9, updated_at = ?10
                 WHERE id = ?11",
                params![
                    request.status.as_str(),
                    request.outcome.as_str(),
                    request.completion_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    request.extension_days,
                    request.pages_processed,
                    request.pages_disclosed,
                    request.fees_charged,
                    request.is_deemed_refusal,
                    request.summary,
                    request.updated_at.to_rfc3339(),
                    request.id.to_string(),
                ],
            )
            .with_context(|| format!("Failed to update request {}", request.request_number))?;

        Ok(request)
    }
}

impl UnitOfWork for SqliteStore {
    fn begin(&self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .context("Failed to begin transaction")
    }

    fn flush(&self) -> Result<()> {
        // Statements already run inside the open transaction
        tracing::debug!("flush: staged rows pending commit");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit transaction")
    }

    fn rollback(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .context("Failed to roll back transaction")
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(idx, format!("bad uuid {}: {}", text, e)))
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad date {}: {}", text, e)))
}

fn optional_date_column(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        NaiveDate::parse_from_str(&t, DATE_FORMAT)
            .map_err(|e| conversion_error(idx, format!("bad date {}: {}", t, e)))
    })
    .transpose()
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {}: {}", text, e)))
}

fn code_column<T>(row: &Row, idx: usize, from_code: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    from_code(&text).ok_or_else(|| conversion_error(idx, format!("unknown code {}", text)))
}

fn public_body_from_row(row: &Row) -> rusqlite::Result<PublicBody> {
    Ok(PublicBody {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        abbreviation: row.get(2)?,
        description: row.get(3)?,
        contact_email: row.get(4)?,
        website_url: row.get(5)?,
        is_active: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

fn ati_request_from_row(row: &Row) -> rusqlite::Result<AtiRequest> {
    Ok(AtiRequest {
        id: uuid_column(row, 0)?,
        request_number: row.get(1)?,
        public_body_id: uuid_column(row, 2)?,
        submission_date: date_column(row, 3)?,
        due_date: date_column(row, 4)?,
        completion_date: optional_date_column(row, 5)?,
        extension_days: row.get(6)?,
        request_type: code_column(row, 7, RequestType::from_code)?,
        status: code_column(row, 8, RequestStatus::from_code)?,
        outcome: code_column(row, 9, RequestOutcome::from_code)?,
        pages_processed: row.get(10)?,
        pages_disclosed: row.get(11)?,
        fees_charged: row.get(12)?,
        is_deemed_refusal: row.get(13)?,
        summary: row.get(14)?,
        created_at: timestamp_column(row, 15)?,
        updated_at: timestamp_column(row, 16)?,
    })
}

// ============================================================================
// READ HELPERS
// ============================================================================

pub fn get_all_public_bodies(conn: &Connection) -> Result<Vec<PublicBody>> {
    let sql = format!(
        "SELECT {} FROM public_bodies ORDER BY name COLLATE NOCASE",
        PUBLIC_BODY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let bodies = stmt
        .query_map([], public_body_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(bodies)
}

pub fn get_ati_requests_for_public_body(
    conn: &Connection,
    public_body_id: &Uuid,
) -> Result<Vec<AtiRequest>> {
    let sql = format!(
        "SELECT {} FROM ati_requests WHERE public_body_id = ?1 ORDER BY submission_date",
        ATI_REQUEST_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let requests = stmt
        .query_map(params![public_body_id.to_string()], ati_request_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(requests)
}

pub fn count_public_bodies(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM public_bodies", [], |row| row.get(0))?;

    Ok(count)
}

pub fn count_ati_requests(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM ati_requests", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// SHA-256 of the raw source bytes, hex encoded
pub fn source_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Audit event describing one finished ingestion run
pub fn ingestion_event(kind: RecordKind, result: &IngestionResult, checksum: &str, actor: &str) -> Event {
    let report = result.to_report();

    Event::new(
        "ingestion_completed",
        "ingestion",
        result.source_file.as_deref().unwrap_or("upload"),
        serde_json::json!({
            "record_kind": kind.as_str(),
            "checksum": checksum,
            "total_records": report.total_records,
            "successful_records": report.successful_records,
            "failed_records": report.failed_records,
            "skipped_records": report.skipped_records,
            "created_count": report.created_count,
            "updated_count": report.updated_count,
            "error_count": report.error_count,
            "warning_count": report.warning_count,
            "is_successful": report.is_successful,
            "duration_seconds": report.duration_seconds,
        }),
        actor,
    )
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_column(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| conversion_error(5, format!("bad event payload: {}", e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
