// 🔀 Field Mapper - raw column names → canonical fields
//
// Every source spells columns differently ("Ref No", "request-id",
// "File Number"); this module folds them onto one closed set of fields per
// record kind and normalizes enum spellings. It never fails: a row always
// comes out as some MappedRecord, possibly with most fields empty.

use crate::parser::ParsedRow;
use crate::validator::parse_flexible_date;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Days added to the submission date when no due date is supplied
pub const DEFAULT_RESPONSE_DAYS: i64 = 30;

// ============================================================================
// RECORD KIND + CANONICAL FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    AtiRequest,
    PublicBody,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::AtiRequest => "ati_request",
            RecordKind::PublicBody => "public_body",
        }
    }

    /// The closed set of canonical fields for this kind
    pub fn fields(&self) -> &'static [Field] {
        match self {
            RecordKind::AtiRequest => &ATI_REQUEST_FIELDS,
            RecordKind::PublicBody => &PUBLIC_BODY_FIELDS,
        }
    }

    fn synonyms(&self) -> &'static HashMap<&'static str, Field> {
        match self {
            RecordKind::AtiRequest => &ATI_REQUEST_SYNONYMS,
            RecordKind::PublicBody => &PUBLIC_BODY_SYNONYMS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    // ATI request
    RequestNumber,
    PublicBodyId,
    PublicBodyName,
    SubmissionDate,
    DueDate,
    CompletionDate,
    RequestType,
    Status,
    Outcome,
    ExtensionDays,
    PagesProcessed,
    PagesDisclosed,
    FeesCharged,
    IsDeemedRefusal,
    Summary,

    // Public body
    Name,
    Abbreviation,
    Description,
    ContactEmail,
    WebsiteUrl,
    IsActive,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::RequestNumber => "request_number",
            Field::PublicBodyId => "public_body_id",
            Field::PublicBodyName => "public_body_name",
            Field::SubmissionDate => "submission_date",
            Field::DueDate => "due_date",
            Field::CompletionDate => "completion_date",
            Field::RequestType => "request_type",
            Field::Status => "status",
            Field::Outcome => "outcome",
            Field::ExtensionDays => "extension_days",
            Field::PagesProcessed => "pages_processed",
            Field::PagesDisclosed => "pages_disclosed",
            Field::FeesCharged => "fees_charged",
            Field::IsDeemedRefusal => "is_deemed_refusal",
            Field::Summary => "summary",
            Field::Name => "name",
            Field::Abbreviation => "abbreviation",
            Field::Description => "description",
            Field::ContactEmail => "contact_email",
            Field::WebsiteUrl => "website_url",
            Field::IsActive => "is_active",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ATI_REQUEST_FIELDS: [Field; 15] = [
    Field::RequestNumber,
    Field::PublicBodyId,
    Field::PublicBodyName,
    Field::SubmissionDate,
    Field::DueDate,
    Field::CompletionDate,
    Field::RequestType,
    Field::Status,
    Field::Outcome,
    Field::ExtensionDays,
    Field::PagesProcessed,
    Field::PagesDisclosed,
    Field::FeesCharged,
    Field::IsDeemedRefusal,
    Field::Summary,
];

const PUBLIC_BODY_FIELDS: [Field; 6] = [
    Field::Name,
    Field::Abbreviation,
    Field::Description,
    Field::ContactEmail,
    Field::WebsiteUrl,
    Field::IsActive,
];

// ============================================================================
// SYNONYM TABLES
// ============================================================================

static ATI_REQUEST_SYNONYMS: Lazy<HashMap<&'static str, Field>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let groups: [(Field, &[&str]); 15] = [
        (
            Field::RequestNumber,
            &["request_no", "request_id", "reference_number", "ref_no", "ref", "file_number"],
        ),
        (Field::PublicBodyId, &[]),
        (
            Field::PublicBodyName,
            &["public_body", "organization", "org", "department", "agency", "institution"],
        ),
        (
            Field::SubmissionDate,
            &["date_received", "received_date", "date_submitted", "filed_date", "request_date"],
        ),
        (Field::DueDate, &["deadline", "statutory_deadline", "response_due"]),
        (
            Field::CompletionDate,
            &["date_completed", "completed_date", "closed_date", "date_closed", "response_date"],
        ),
        (Field::RequestType, &["type", "category"]),
        (Field::Status, &["request_status", "current_status", "state"]),
        (Field::Outcome, &["disposition", "result", "decision"]),
        (Field::ExtensionDays, &["extension", "days_extended", "ext_days"]),
        (Field::PagesProcessed, &["pages_reviewed", "total_pages"]),
        (Field::PagesDisclosed, &["pages_released", "disclosed_pages"]),
        (Field::FeesCharged, &["fees", "fee", "amount_charged", "cost"]),
        (Field::IsDeemedRefusal, &["deemed_refusal", "overdue"]),
        (
            Field::Summary,
            &["description", "request_summary", "subject", "topic"],
        ),
    ];

    for (field, synonyms) in groups {
        table.insert(field.as_str(), field);
        for synonym in synonyms.iter().copied() {
            table.insert(synonym, field);
        }
    }
    table
});

static PUBLIC_BODY_SYNONYMS: Lazy<HashMap<&'static str, Field>> = Lazy::new(|| {
    let mut table = HashMap::new();
    let groups: [(Field, &[&str]); 6] = [
        (
            Field::Name,
            &["organization_name", "org_name", "public_body_name", "department_name"],
        ),
        (Field::Abbreviation, &["abbr", "short_name", "acronym"]),
        (Field::Description, &["mandate", "about"]),
        (Field::ContactEmail, &["email", "ati_email"]),
        (Field::WebsiteUrl, &["website", "url"]),
        (Field::IsActive, &["active"]),
    ];

    for (field, synonyms) in groups {
        table.insert(field.as_str(), field);
        for synonym in synonyms.iter().copied() {
            table.insert(synonym, field);
        }
    }
    table
});

/// Value synonyms for the status vocabulary
pub const STATUS_SYNONYMS: &[(&str, &str)] = &[
    ("new", "received"),
    ("open", "received"),
    ("opened", "received"),
    ("processing", "in_progress"),
    ("active", "in_progress"),
    ("ongoing", "in_progress"),
    ("underway", "in_progress"),
    ("awaiting_clarification", "pending_clarification"),
    ("clarification_needed", "pending_clarification"),
    ("extension", "extended"),
    ("time_extended", "extended"),
    ("complete", "completed"),
    ("closed", "completed"),
    ("done", "completed"),
    ("finished", "completed"),
    ("resolved", "completed"),
    ("inactive", "abandoned"),
    ("expired", "abandoned"),
    ("transfer", "transferred"),
    ("referred", "transferred"),
];

/// Value synonyms for the outcome vocabulary
pub const OUTCOME_SYNONYMS: &[(&str, &str)] = &[
    ("fully_disclosed", "full_disclosure"),
    ("all_disclosed", "full_disclosure"),
    ("complete_disclosure", "full_disclosure"),
    ("partially_disclosed", "partial_disclosure"),
    ("partial", "partial_disclosure"),
    ("none_disclosed", "no_disclosure"),
    ("denied", "no_disclosure"),
    ("refused", "no_disclosure"),
    ("exemption", "no_disclosure"),
    ("no_records", "no_records_exist"),
    ("not_found", "no_records_exist"),
    ("transfer", "transferred"),
    ("referred", "transferred"),
    ("inactive", "abandoned"),
    ("withdraw", "withdrawn"),
    ("cancelled", "withdrawn"),
    ("canceled", "withdrawn"),
    ("in_progress", "pending"),
    ("ongoing", "pending"),
    ("open", "pending"),
];

/// Value synonyms for the request type vocabulary
pub const REQUEST_TYPE_SYNONYMS: &[(&str, &str)] = &[
    ("personal_information", "personal"),
    ("privacy", "personal"),
    ("nonpersonal", "non_personal"),
    ("access", "non_personal"),
    ("ati", "non_personal"),
    ("foi", "non_personal"),
    ("foia", "non_personal"),
    ("general", "non_personal"),
    ("combined", "mixed"),
    ("both", "mixed"),
    ("correct", "correction"),
    ("amendment", "correction"),
    ("amend", "correction"),
];

static SEPARATOR_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-.]+").expect("valid separator regex"));
static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_]").expect("valid column charset regex"));
static UNDERSCORE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_+").expect("valid underscore regex"));
static ENUM_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-]+").expect("valid enum separator regex"));

// ============================================================================
// MAPPED RECORD
// ============================================================================

/// A row after column mapping: canonical fields plus unmapped pass-through columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRecord {
    pub kind: RecordKind,
    pub row_number: usize,
    pub values: BTreeMap<Field, Option<String>>,
    /// Columns with no canonical field, under their normalized names
    pub extras: Vec<(String, Option<String>)>,
}

impl MappedRecord {
    pub fn new(kind: RecordKind, row_number: usize) -> Self {
        MappedRecord {
            kind,
            row_number,
            values: BTreeMap::new(),
            extras: Vec::new(),
        }
    }

    /// Non-null value of a canonical field
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).and_then(|v| v.as_deref())
    }

    /// Set a canonical field unless it already holds a non-null value
    ///
    /// Returns whether the value was stored.
    pub fn offer(&mut self, field: Field, value: Option<String>) -> bool {
        match self.values.get(&field) {
            Some(Some(_)) => false,
            _ => {
                self.values.insert(field, value);
                true
            }
        }
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        self.values.insert(field, value);
    }

    pub fn extra(&self, name: &str) -> Option<&str> {
        self.extras
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }
}

// ============================================================================
// TRANSFORMER
// ============================================================================

/// Maps ParsedRows to MappedRecords
///
/// Carries optional per-kind synonym additions on top of the built-in tables.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    custom: HashMap<(RecordKind, String), Field>,
}

impl Transformer {
    pub fn new() -> Self {
        Transformer::default()
    }

    /// Teach the transformer an extra column name for a field
    ///
    /// The synonym is normalized the same way incoming headers are, and takes
    /// precedence over the built-in tables.
    pub fn add_mapping(&mut self, kind: RecordKind, synonym: &str, field: Field) {
        self.custom
            .insert((kind, normalize_column_name(synonym)), field);
    }

    /// Canonical field for a normalized column name
    pub fn lookup(&self, kind: RecordKind, normalized: &str) -> Option<Field> {
        self.custom
            .get(&(kind, normalized.to_string()))
            .copied()
            .or_else(|| kind.synonyms().get(normalized).copied())
    }

    pub fn transform(&self, row: &ParsedRow, kind: RecordKind) -> MappedRecord {
        match kind {
            RecordKind::AtiRequest => self.transform_ati_request(row),
            RecordKind::PublicBody => self.transform_public_body(row),
        }
    }

    pub fn transform_ati_request(&self, row: &ParsedRow) -> MappedRecord {
        let mut record = self.map_columns(row, RecordKind::AtiRequest);

        for (field, synonyms) in [
            (Field::Status, STATUS_SYNONYMS),
            (Field::Outcome, OUTCOME_SYNONYMS),
            (Field::RequestType, REQUEST_TYPE_SYNONYMS),
        ] {
            if let Some(raw) = record.get(field) {
                let normalized = normalize_enum_value(raw, synonyms);
                record.set(field, Some(normalized));
            }
        }

        // Any submission string that parses with the validator's layouts counts
        // as a date here, so rows without a due date get submission + 30 days
        if record.get(Field::DueDate).is_none() {
            if let Some(due) = record
                .get(Field::SubmissionDate)
                .and_then(derive_due_date)
            {
                record.set(Field::DueDate, Some(due));
            }
        }

        record
    }

    pub fn transform_public_body(&self, row: &ParsedRow) -> MappedRecord {
        self.map_columns(row, RecordKind::PublicBody)
    }

    pub fn batch_transform(&self, rows: &[ParsedRow], kind: RecordKind) -> Vec<MappedRecord> {
        rows.iter().map(|row| self.transform(row, kind)).collect()
    }

    fn map_columns(&self, row: &ParsedRow, kind: RecordKind) -> MappedRecord {
        let mut record = MappedRecord::new(kind, row.row_number);

        for (column, value) in &row.fields {
            let normalized = normalize_column_name(column);

            match self.lookup(kind, &normalized) {
                Some(field) => {
                    record.offer(field, value.clone());
                }
                None => record.extras.push((normalized, value.clone())),
            }
        }

        record
    }
}

// ============================================================================
// NORMALIZATION HELPERS
// ============================================================================

/// Fold a raw header into snake_case ("Request (Number)" → "request_number")
pub fn normalize_column_name(column: &str) -> String {
    let lowered = column.trim().to_lowercase();
    let separated = SEPARATOR_RUNS.replace_all(&lowered, "_");
    let cleaned = DISALLOWED_CHARS.replace_all(&separated, "");
    let collapsed = UNDERSCORE_RUNS.replace_all(&cleaned, "_");

    collapsed.trim_matches('_').to_string()
}

/// Lower-case, underscore and look up an enum spelling; unknown values pass through
pub fn normalize_enum_value(raw: &str, synonyms: &[(&str, &str)]) -> String {
    let lowered = raw.trim().to_lowercase();
    let normalized = ENUM_SEPARATORS.replace_all(&lowered, "_").into_owned();

    synonyms
        .iter()
        .find(|(synonym, _)| *synonym == normalized)
        .map(|(_, code)| code.to_string())
        .unwrap_or(normalized)
}

/// Submission date + 30 days, when the submission date parses
pub fn derive_due_date(submission: &str) -> Option<String> {
    parse_flexible_date(submission)
        .map(|date| (date + Duration::days(DEFAULT_RESPONSE_DAYS)).format("%Y-%m-%d").to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, Option<&str>)]) -> ParsedRow {
        ParsedRow::new(
            2,
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
        )
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("Request Number"), "request_number");
        assert_eq!(normalize_column_name("  Request (Number) "), "request_number");
        assert_eq!(normalize_column_name("submission-date"), "submission_date");
        assert_eq!(normalize_column_name("Ref. No."), "ref_no");
        assert_eq!(normalize_column_name("__Due   Date__"), "due_date");
        assert_eq!(normalize_column_name("Fees ($)"), "fees");
    }

    #[test]
    fn test_synonyms_map_to_canonical_fields() {
        let transformer = Transformer::new();
        let record = transformer.transform_ati_request(&row(&[
            ("Ref No", Some("ATI-7")),
            ("Department", Some("Health Canada")),
            ("Date Received", Some("2024-03-01")),
            ("Deadline", Some("2024-03-31")),
            ("Disposition", Some("denied")),
            ("Total Pages", Some("12")),
            ("Cost", Some("$5.00")),
            ("Overdue", Some("yes")),
            ("Subject", Some("Procurement files")),
        ]));

        assert_eq!(record.get(Field::RequestNumber), Some("ATI-7"));
        assert_eq!(record.get(Field::PublicBodyName), Some("Health Canada"));
        assert_eq!(record.get(Field::SubmissionDate), Some("2024-03-01"));
        assert_eq!(record.get(Field::DueDate), Some("2024-03-31"));
        assert_eq!(record.get(Field::Outcome), Some("no_disclosure"));
        assert_eq!(record.get(Field::PagesProcessed), Some("12"));
        assert_eq!(record.get(Field::FeesCharged), Some("$5.00"));
        assert_eq!(record.get(Field::IsDeemedRefusal), Some("yes"));
        assert_eq!(record.get(Field::Summary), Some("Procurement files"));
        assert!(record.extras.is_empty());
    }

    #[test]
    fn test_first_writer_wins() {
        let transformer = Transformer::new();
        let record = transformer.transform_ati_request(&row(&[
            ("request_number", Some("FIRST")),
            ("ref_no", Some("SECOND")),
        ]));
        assert_eq!(record.get(Field::RequestNumber), Some("FIRST"));
    }

    #[test]
    fn test_later_synonym_fills_null() {
        let transformer = Transformer::new();
        let record = transformer.transform_ati_request(&row(&[
            ("request_number", None),
            ("file_number", Some("F-22")),
        ]));
        assert_eq!(record.get(Field::RequestNumber), Some("F-22"));
    }

    #[test]
    fn test_unmapped_columns_pass_through() {
        let transformer = Transformer::new();
        let record = transformer.transform_ati_request(&row(&[
            ("Request Number", Some("A-1")),
            ("Analyst Notes", Some("call back")),
        ]));

        assert_eq!(record.extra("analyst_notes"), Some("call back"));
        assert_eq!(record.extras.len(), 1);
    }

    #[test]
    fn test_enum_values_normalized() {
        let transformer = Transformer::new();
        let record = transformer.transform_ati_request(&row(&[
            ("status", Some("In Progress")),
            ("outcome", Some("Partially-Disclosed")),
            ("type", Some("FOIA")),
        ]));

        assert_eq!(record.get(Field::Status), Some("in_progress"));
        assert_eq!(record.get(Field::Outcome), Some("partial_disclosure"));
        assert_eq!(record.get(Field::RequestType), Some("non_personal"));
    }

    #[test]
    fn test_status_synonyms() {
        assert_eq!(normalize_enum_value("new", STATUS_SYNONYMS), "received");
        assert_eq!(normalize_enum_value("Closed", STATUS_SYNONYMS), "completed");
        assert_eq!(normalize_enum_value("active", STATUS_SYNONYMS), "in_progress");
        assert_eq!(normalize_enum_value("Clarification Needed", STATUS_SYNONYMS), "pending_clarification");
        assert_eq!(normalize_enum_value("amendment", REQUEST_TYPE_SYNONYMS), "correction");
        // Unknown values pass through for the validator to judge
        assert_eq!(normalize_enum_value("Mystery Value", STATUS_SYNONYMS), "mystery_value");
    }

    #[test]
    fn test_due_date_derived_from_submission() {
        let transformer = Transformer::new();
        let record = transformer.transform_ati_request(&row(&[
            ("request_number", Some("A-1")),
            ("submission_date", Some("2024-01-15")),
        ]));
        assert_eq!(record.get(Field::DueDate), Some("2024-02-14"));

        let record = transformer.transform_ati_request(&row(&[("submission_date", Some("15/01/2024"))]));
        assert_eq!(record.get(Field::DueDate), Some("2024-02-14"));
    }

    #[test]
    fn test_due_date_not_derived_from_garbage() {
        let transformer = Transformer::new();
        let record = transformer.transform_ati_request(&row(&[("submission_date", Some("last tuesday"))]));
        assert_eq!(record.get(Field::DueDate), None);
    }

    #[test]
    fn test_public_body_mapping() {
        let transformer = Transformer::new();
        let record = transformer.transform_public_body(&row(&[
            ("Organization Name", Some("Treasury Board Secretariat")),
            ("Acronym", Some("TBS")),
            ("Mandate", Some("Oversight")),
            ("ATI Email", Some("ATI@tbs.gc.ca")),
            ("Website", Some("tbs.gc.ca")),
            ("Active", Some("yes")),
        ]));

        assert_eq!(record.kind, RecordKind::PublicBody);
        assert_eq!(record.get(Field::Name), Some("Treasury Board Secretariat"));
        assert_eq!(record.get(Field::Abbreviation), Some("TBS"));
        assert_eq!(record.get(Field::Description), Some("Oversight"));
        assert_eq!(record.get(Field::ContactEmail), Some("ATI@tbs.gc.ca"));
        assert_eq!(record.get(Field::WebsiteUrl), Some("tbs.gc.ca"));
        assert_eq!(record.get(Field::IsActive), Some("yes"));
    }

    #[test]
    fn test_custom_mapping() {
        let mut transformer = Transformer::new();
        transformer.add_mapping(RecordKind::AtiRequest, "Dossier", Field::RequestNumber);

        let record = transformer.transform(&row(&[("DOSSIER", Some("D-9"))]), RecordKind::AtiRequest);
        assert_eq!(record.get(Field::RequestNumber), Some("D-9"));

        // Only for the kind it was registered on
        let record = transformer.transform(&row(&[("dossier", Some("D-9"))]), RecordKind::PublicBody);
        assert_eq!(record.extra("dossier"), Some("D-9"));
    }

    #[test]
    fn test_batch_transform_keeps_order_and_row_numbers() {
        let rows = vec![
            ParsedRow::new(2, vec![("name".to_string(), Some("A".to_string()))]),
            ParsedRow::new(4, vec![("name".to_string(), Some("B".to_string()))]),
        ];
        let records = Transformer::new().batch_transform(&rows, RecordKind::PublicBody);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].row_number, 2);
        assert_eq!(records[1].row_number, 4);
        assert_eq!(records[1].get(Field::Name), Some("B"));
    }

    #[test]
    fn test_kind_fields_are_closed_sets() {
        assert_eq!(RecordKind::AtiRequest.fields().len(), 15);
        assert_eq!(RecordKind::PublicBody.fields().len(), 6);
        assert!(!RecordKind::PublicBody.fields().contains(&Field::Status));
    }
}
