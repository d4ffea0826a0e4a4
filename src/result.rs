// 📊 Ingestion Result - per-row findings + run statistics
//
// One IngestionResult per run: created with zero counters, mutated row by
// row, sealed by mark_complete(), then only read for reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Errors and warnings beyond this many are counted but not reported
pub const REPORT_LIST_LIMIT: usize = 50;

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,  // Value repaired or defaulted, row still accepted
    Error,    // Row rejected, run continues
    Critical, // Run aborted
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RECORD ERROR
// ============================================================================

/// One finding against one source row (row 0 = the file as a whole)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub row_number: usize,
    pub field_name: Option<String>,
    pub error_message: String,
    pub severity: Severity,
    pub raw_value: Option<String>,
}

impl RecordError {
    pub fn new(
        row_number: usize,
        field_name: Option<&str>,
        error_message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        RecordError {
            row_number,
            field_name: field_name.map(str::to_string),
            error_message: error_message.into(),
            severity,
            raw_value: None,
        }
    }

    pub fn with_raw_value(mut self, raw_value: impl Into<String>) -> Self {
        self.raw_value = Some(raw_value.into());
        self
    }

    pub fn refers_to(&self, field: &str) -> bool {
        self.field_name.as_deref() == Some(field)
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {} [{}]", self.row_number, self.severity)?;
        if let Some(field) = &self.field_name {
            write!(f, " {}:", field)?;
        }
        write!(f, " {}", self.error_message)
    }
}

// ============================================================================
// INGESTION RESULT
// ============================================================================

/// Outcome of one ingestion run
///
/// Fields are public for reading. Once `mark_complete` has run the result is
/// sealed: `add_error` ignores further findings and callers must treat the
/// counters as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionResult {
    // Counts
    pub total_records: usize,
    pub successful_records: usize,
    pub failed_records: usize,
    pub skipped_records: usize,

    // Timing
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    // Source
    pub source_file: Option<String>,
    pub source_type: String,

    /// ERROR and CRITICAL findings, in the order they were raised
    pub errors: Vec<RecordError>,
    pub warnings: Vec<RecordError>,

    pub created_ids: Vec<Uuid>,
    pub updated_ids: Vec<Uuid>,
}

impl IngestionResult {
    pub fn new(source_file: Option<String>, source_type: &str) -> Self {
        IngestionResult {
            total_records: 0,
            successful_records: 0,
            failed_records: 0,
            skipped_records: 0,
            started_at: Utc::now(),
            completed_at: None,
            source_file,
            source_type: source_type.to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
            created_ids: Vec::new(),
            updated_ids: Vec::new(),
        }
    }

    /// Successful records as a percentage of all records (0.0 when empty)
    pub fn success_rate(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        self.successful_records as f64 / self.total_records as f64 * 100.0
    }

    /// Seconds between start and completion; None until sealed
    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0)
    }

    /// True iff no CRITICAL finding was recorded
    pub fn is_successful(&self) -> bool {
        !self.errors.iter().any(|e| e.severity == Severity::Critical)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn created_count(&self) -> usize {
        self.created_ids.len()
    }

    pub fn updated_count(&self) -> usize {
        self.updated_ids.len()
    }

    /// Record a finding, routed by severity; a no-op once sealed
    pub fn add_error(&mut self, error: RecordError) {
        if self.is_complete() {
            tracing::warn!(finding = %error, "Finding dropped: result already sealed");
            return;
        }

        match error.severity {
            Severity::Warning => self.warnings.push(error),
            Severity::Error | Severity::Critical => self.errors.push(error),
        }
    }

    /// Shorthand for a finding without a raw value
    pub fn add(&mut self, row: usize, field: Option<&str>, message: impl Into<String>, severity: Severity) {
        self.add_error(RecordError::new(row, field, message, severity));
    }

    /// Absorb findings produced by a validator for one row
    pub fn extend_findings<I>(&mut self, findings: I)
    where
        I: IntoIterator<Item = RecordError>,
    {
        for finding in findings {
            self.add_error(finding);
        }
    }

    /// Stamp completion time; later calls keep the first stamp
    pub fn mark_complete(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Human-readable multi-line summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Ingestion Result: {}",
                self.source_file.as_deref().unwrap_or("Unknown source")
            ),
            format!("  Total Records: {}", self.total_records),
            format!("  Successful: {}", self.successful_records),
            format!("  Failed: {}", self.failed_records),
            format!("  Skipped: {}", self.skipped_records),
            format!("  Success Rate: {:.1}%", self.success_rate()),
        ];

        if let Some(duration) = self.duration_seconds().filter(|d| *d > 0.0) {
            lines.push(format!("  Duration: {:.2}s", duration));
        }
        if !self.errors.is_empty() {
            lines.push(format!("  Errors: {}", self.errors.len()));
        }
        if !self.warnings.is_empty() {
            lines.push(format!("  Warnings: {}", self.warnings.len()));
        }

        lines.join("\n")
    }

    /// Serializable view for API responses and audit events
    pub fn to_report(&self) -> IngestionReport {
        IngestionReport {
            total_records: self.total_records,
            successful_records: self.successful_records,
            failed_records: self.failed_records,
            skipped_records: self.skipped_records,
            success_rate: (self.success_rate() * 100.0).round() / 100.0,
            duration_seconds: self.duration_seconds(),
            source_file: self.source_file.clone(),
            source_type: self.source_type.clone(),
            is_successful: self.is_successful(),
            error_count: self.errors.len(),
            warning_count: self.warnings.len(),
            errors: self.errors.iter().take(REPORT_LIST_LIMIT).cloned().collect(),
            warnings: self.warnings.iter().take(REPORT_LIST_LIMIT).cloned().collect(),
            created_count: self.created_count(),
            updated_count: self.updated_count(),
        }
    }
}

// ============================================================================
// INGESTION REPORT
// ============================================================================

/// External shape of an IngestionResult
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub total_records: usize,
    pub successful_records: usize,
    pub failed_records: usize,
    pub skipped_records: usize,
    pub success_rate: f64,
    pub duration_seconds: Option<f64>,
    pub source_file: Option<String>,
    pub source_type: String,
    pub is_successful: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub errors: Vec<RecordError>,
    pub warnings: Vec<RecordError>,
    pub created_count: usize,
    pub updated_count: usize,
}

// ============================================================================
// TESTS
// ============================================================================
