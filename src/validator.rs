// ✅ Record Validator - raw strings → typed, checked records
//
// Per-field coercion (dates, integers, money, booleans, bounded strings,
// enum codes) followed by cross-field rules. Findings are collected on the
// validator for the record just checked; the next call starts clean.

use crate::entities::{
    AtiRequestPatch, NewAtiRequest, NewPublicBody, PublicBodyPatch, RequestOutcome,
    RequestStatus, RequestType,
};
use crate::result::{RecordError, Severity};
use crate::transformer::{Field, MappedRecord, RecordKind};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Date layouts tried in order; the first that parses wins
pub const DATE_FORMATS: [&str; 10] = [
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

pub const MAX_REQUEST_NUMBER_CHARS: usize = 100;
pub const MAX_SUMMARY_CHARS: usize = 10_000;
pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_ABBREVIATION_CHARS: usize = 50;
pub const MAX_URL_CHARS: usize = 500;

const TRUE_VALUES: [&str; 6] = ["true", "yes", "y", "1", "on", "x"];
const FALSE_VALUES: [&str; 6] = ["false", "no", "n", "0", "off", ""];

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}.*$").expect("valid url regex")
});

/// Parse a date in any of the accepted layouts
pub fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

// ============================================================================
// ENUM VOCABULARIES
// ============================================================================

/// A closed vocabulary of codes, iterated in declaration order
pub trait Vocabulary: Copy + 'static {
    fn all() -> &'static [Self];
    fn code(&self) -> &'static str;
}

impl Vocabulary for RequestStatus {
    fn all() -> &'static [Self] {
        &RequestStatus::ALL
    }
    fn code(&self) -> &'static str {
        self.as_str()
    }
}

impl Vocabulary for RequestType {
    fn all() -> &'static [Self] {
        &RequestType::ALL
    }
    fn code(&self) -> &'static str {
        self.as_str()
    }
}

impl Vocabulary for RequestOutcome {
    fn all() -> &'static [Self] {
        &RequestOutcome::ALL
    }
    fn code(&self) -> &'static str {
        self.as_str()
    }
}

// ============================================================================
// CLEAN RECORDS
// ============================================================================

/// Typed ATI request fields after validation
///
/// Required fields stay optional here: a record that failed validation still
/// carries whatever could be cleaned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanAtiRequest {
    pub request_number: Option<String>,
    pub submission_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Raw reference; resolved to a UUID by the orchestrator
    pub public_body_id: Option<String>,
    pub public_body_name: Option<String>,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub outcome: RequestOutcome,
    pub completion_date: Option<NaiveDate>,
    pub extension_days: i64,
    pub pages_processed: Option<i64>,
    pub pages_disclosed: Option<i64>,
    pub fees_charged: Option<f64>,
    pub is_deemed_refusal: bool,
    pub summary: Option<String>,
}

impl CleanAtiRequest {
    /// Creation fields, once the public body is resolved
    ///
    /// None when a required field is missing, which only happens for records
    /// that failed validation.
    pub fn to_new(&self, public_body_id: Uuid) -> Option<NewAtiRequest> {
        Some(NewAtiRequest {
            request_number: self.request_number.clone()?,
            public_body_id,
            submission_date: self.submission_date?,
            due_date: self.due_date?,
            completion_date: self.completion_date,
            extension_days: self.extension_days,
            request_type: self.request_type,
            status: self.status,
            outcome: self.outcome,
            pages_processed: self.pages_processed,
            pages_disclosed: self.pages_disclosed,
            fees_charged: self.fees_charged,
            is_deemed_refusal: self.is_deemed_refusal,
            summary: self.summary.clone(),
        })
    }

    pub fn to_patch(&self) -> AtiRequestPatch {
        AtiRequestPatch {
            status: Some(self.status),
            outcome: Some(self.outcome),
            completion_date: self.completion_date,
            extension_days: Some(self.extension_days),
            pages_processed: self.pages_processed,
            pages_disclosed: self.pages_disclosed,
            fees_charged: self.fees_charged,
            is_deemed_refusal: self.is_deemed_refusal,
            summary: self.summary.clone(),
        }
    }
}

/// Typed public body fields after validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanPublicBody {
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,
}

impl CleanPublicBody {
    pub fn to_new(&self) -> Option<NewPublicBody> {
        Some(NewPublicBody {
            name: self.name.clone()?,
            abbreviation: self.abbreviation.clone(),
            description: self.description.clone(),
            contact_email: self.contact_email.clone(),
            website_url: self.website_url.clone(),
            is_active: self.is_active,
        })
    }

    pub fn to_patch(&self) -> PublicBodyPatch {
        PublicBodyPatch {
            abbreviation: self.abbreviation.clone(),
            description: self.description.clone(),
            contact_email: self.contact_email.clone(),
            website_url: self.website_url.clone(),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CleanRecord {
    AtiRequest(CleanAtiRequest),
    PublicBody(CleanPublicBody),
}

// ============================================================================
// RECORD VALIDATOR
// ============================================================================

pub struct RecordValidator {
    /// Every WARNING becomes an ERROR
    strict_mode: bool,
    errors: Vec<RecordError>,
    warnings: Vec<RecordError>,
}

impl RecordValidator {
    pub fn new(strict_mode: bool) -> Self {
        RecordValidator {
            strict_mode,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// ERROR findings for the last record validated
    pub fn errors(&self) -> &[RecordError] {
        &self.errors
    }

    /// WARNING findings for the last record validated
    pub fn warnings(&self) -> &[RecordError] {
        &self.warnings
    }

    /// Drain the findings of the last record, errors first
    pub fn take_findings(&mut self) -> Vec<RecordError> {
        let mut findings = std::mem::take(&mut self.errors);
        findings.append(&mut self.warnings);
        findings
    }

    pub fn reset(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }

    pub fn validate(&mut self, record: &MappedRecord) -> (bool, CleanRecord) {
        match record.kind {
            RecordKind::AtiRequest => {
                let (valid, clean) = self.validate_ati_request(record);
                (valid, CleanRecord::AtiRequest(clean))
            }
            RecordKind::PublicBody => {
                let (valid, clean) = self.validate_public_body(record);
                (valid, CleanRecord::PublicBody(clean))
            }
        }
    }

    pub fn validate_ati_request(&mut self, record: &MappedRecord) -> (bool, CleanAtiRequest) {
        self.reset();
        let row = record.row_number;

        let request_number = self.validate_request_number(record.get(Field::RequestNumber), row);
        let submission_date =
            self.validate_date(record.get(Field::SubmissionDate), Field::SubmissionDate, row, true);
        let due_date = self.validate_date(record.get(Field::DueDate), Field::DueDate, row, true);

        // Resolution happens downstream; only presence is checked here
        let public_body_id = record.get(Field::PublicBodyId).map(str::to_string);
        let public_body_name = record.get(Field::PublicBodyName).map(str::to_string);
        if public_body_id.is_none() && public_body_name.is_none() {
            self.push_error(
                row,
                "public_body",
                "Either public_body_id or public_body_name is required",
                None,
            );
        }

        let request_type = self
            .validate_enum(record.get(Field::RequestType), Field::RequestType, row, Some(RequestType::default()))
            .unwrap_or_default();
        let status = self
            .validate_enum(record.get(Field::Status), Field::Status, row, Some(RequestStatus::default()))
            .unwrap_or_default();
        let outcome = self
            .validate_enum(record.get(Field::Outcome), Field::Outcome, row, Some(RequestOutcome::default()))
            .unwrap_or_default();

        let completion_date =
            self.validate_date(record.get(Field::CompletionDate), Field::CompletionDate, row, false);

        let extension_days = self
            .validate_integer(record.get(Field::ExtensionDays), Field::ExtensionDays, row, Some(0), Some(0))
            .unwrap_or(0);
        let pages_processed =
            self.validate_integer(record.get(Field::PagesProcessed), Field::PagesProcessed, row, Some(0), None);
        let pages_disclosed =
            self.validate_integer(record.get(Field::PagesDisclosed), Field::PagesDisclosed, row, Some(0), None);

        let fees_charged =
            self.validate_float(record.get(Field::FeesCharged), Field::FeesCharged, row, Some(0.0), None);

        let is_deemed_refusal =
            self.validate_boolean(record.get(Field::IsDeemedRefusal), Field::IsDeemedRefusal, row, false);

        let summary =
            self.validate_string(record.get(Field::Summary), Field::Summary, row, false, Some(MAX_SUMMARY_CHARS));

        let clean = CleanAtiRequest {
            request_number,
            submission_date,
            due_date,
            public_body_id,
            public_body_name,
            request_type,
            status,
            outcome,
            completion_date,
            extension_days,
            pages_processed,
            pages_disclosed,
            fees_charged,
            is_deemed_refusal,
            summary,
        };

        self.check_date_order(&clean, row);
        self.check_page_counts(&clean, row);

        (self.errors.is_empty(), clean)
    }

    pub fn validate_public_body(&mut self, record: &MappedRecord) -> (bool, CleanPublicBody) {
        self.reset();
        let row = record.row_number;

        let clean = CleanPublicBody {
            name: self.validate_string(record.get(Field::Name), Field::Name, row, true, Some(MAX_NAME_CHARS)),
            abbreviation: self.validate_string(
                record.get(Field::Abbreviation),
                Field::Abbreviation,
                row,
                false,
                Some(MAX_ABBREVIATION_CHARS),
            ),
            description: self.validate_string(record.get(Field::Description), Field::Description, row, false, None),
            contact_email: self.validate_email(record.get(Field::ContactEmail), Field::ContactEmail, row),
            website_url: self.validate_url(record.get(Field::WebsiteUrl), Field::WebsiteUrl, row),
            is_active: self.validate_boolean(record.get(Field::IsActive), Field::IsActive, row, true),
        };

        (self.errors.is_empty(), clean)
    }

    // ========================================================================
    // FIELD RULES
    // ========================================================================

    fn validate_request_number(&mut self, raw: Option<&str>, row: usize) -> Option<String> {
        let Some(value) = non_blank(raw) else {
            self.push_error(row, Field::RequestNumber.as_str(), "Request number is required", None);
            return None;
        };

        if value.chars().count() > MAX_REQUEST_NUMBER_CHARS {
            self.push_error(
                row,
                Field::RequestNumber.as_str(),
                format!("Request number too long (max {} chars)", MAX_REQUEST_NUMBER_CHARS),
                Some(value),
            );
            return None;
        }

        Some(value.to_string())
    }

    fn validate_date(
        &mut self,
        raw: Option<&str>,
        field: Field,
        row: usize,
        required: bool,
    ) -> Option<NaiveDate> {
        let Some(value) = non_blank(raw) else {
            if required {
                self.push_error(row, field.as_str(), format!("{} is required", field), None);
            }
            return None;
        };

        match parse_flexible_date(value) {
            Some(date) => Some(date),
            None => {
                self.push_error(
                    row,
                    field.as_str(),
                    format!("Could not parse date: {}", value),
                    Some(value),
                );
                None
            }
        }
    }

    /// Exact code, then first containment match in declaration order, then default
    fn validate_enum<T: Vocabulary>(
        &mut self,
        raw: Option<&str>,
        field: Field,
        row: usize,
        default: Option<T>,
    ) -> Option<T> {
        let Some(value) = non_blank(raw) else {
            return default;
        };

        let value = value.to_lowercase().replace(' ', "_").replace('-', "_");

        if let Some(exact) = T::all().iter().find(|v| v.code() == value) {
            return Some(*exact);
        }

        if let Some(fuzzy) = T::all()
            .iter()
            .find(|v| v.code().contains(value.as_str()) || value.contains(v.code()))
        {
            self.push_warning(
                row,
                field.as_str(),
                format!("Mapped '{}' to '{}'", value, fuzzy.code()),
                Some(&value),
            );
            return Some(*fuzzy);
        }

        if let Some(default) = default {
            self.push_warning(
                row,
                field.as_str(),
                format!("Invalid value '{}', using default '{}'", value, default.code()),
                Some(&value),
            );
            return Some(default);
        }

        let valid = T::all().iter().map(|v| v.code()).collect::<Vec<_>>().join(", ");
        self.push_error(
            row,
            field.as_str(),
            format!("Invalid value '{}'. Valid: {}", value, valid),
            Some(&value),
        );
        None
    }

    fn validate_integer(
        &mut self,
        raw: Option<&str>,
        field: Field,
        row: usize,
        min: Option<i64>,
        default: Option<i64>,
    ) -> Option<i64> {
        let Some(value) = non_blank(raw) else {
            return default;
        };

        let cleaned = value.replace(',', "");
        let parsed = match cleaned.parse::<i64>() {
            Ok(int) => int,
            Err(_) => match cleaned.parse::<f64>() {
                Ok(float) if float.is_finite() && float.abs() < i64::MAX as f64 => {
                    let truncated = float.trunc() as i64;
                    if float.fract() != 0.0 {
                        self.push_warning(
                            row,
                            field.as_str(),
                            format!("Truncated decimal value {} to {}", value, truncated),
                            Some(value),
                        );
                    }
                    truncated
                }
                _ => {
                    self.push_error(
                        row,
                        field.as_str(),
                        format!("Could not parse as integer: {}", value),
                        Some(value),
                    );
                    return default;
                }
            },
        };

        if let Some(min) = min {
            if parsed < min {
                self.push_error(
                    row,
                    field.as_str(),
                    format!("Value {} below minimum {}", parsed, min),
                    Some(value),
                );
                return default;
            }
        }

        Some(parsed)
    }

    fn validate_float(
        &mut self,
        raw: Option<&str>,
        field: Field,
        row: usize,
        min: Option<f64>,
        default: Option<f64>,
    ) -> Option<f64> {
        let Some(value) = non_blank(raw) else {
            return default;
        };

        let cleaned: String = value
            .chars()
            .filter(|c| !matches!(c, ',' | '$' | '€' | '£'))
            .collect();

        let parsed = match cleaned.trim().parse::<f64>() {
            Ok(float) if float.is_finite() => float,
            _ => {
                self.push_error(
                    row,
                    field.as_str(),
                    format!("Could not parse as number: {}", value),
                    Some(value),
                );
                return default;
            }
        };

        if let Some(min) = min {
            if parsed < min {
                self.push_error(
                    row,
                    field.as_str(),
                    format!("Value {:?} below minimum {:?}", parsed, min),
                    Some(value),
                );
                return default;
            }
        }

        Some(parsed)
    }

    fn validate_boolean(&mut self, raw: Option<&str>, field: Field, row: usize, default: bool) -> bool {
        let Some(value) = raw else {
            return default;
        };

        let lowered = value.trim().to_lowercase();
        if TRUE_VALUES.contains(&lowered.as_str()) {
            return true;
        }
        if FALSE_VALUES.contains(&lowered.as_str()) {
            return false;
        }

        self.push_warning(
            row,
            field.as_str(),
            format!("Could not parse '{}' as boolean, using {}", value, default),
            Some(value),
        );
        default
    }

    fn validate_string(
        &mut self,
        raw: Option<&str>,
        field: Field,
        row: usize,
        required: bool,
        max_chars: Option<usize>,
    ) -> Option<String> {
        let Some(value) = non_blank(raw) else {
            if required {
                self.push_error(row, field.as_str(), format!("{} is required", field), None);
            }
            return None;
        };

        if let Some(max) = max_chars {
            let length = value.chars().count();
            if length > max {
                self.push_warning(
                    row,
                    field.as_str(),
                    format!("Truncated from {} to {} chars", length, max),
                    None,
                );
                return Some(value.chars().take(max).collect());
            }
        }

        Some(value.to_string())
    }

    fn validate_email(&mut self, raw: Option<&str>, field: Field, row: usize) -> Option<String> {
        let value = non_blank(raw)?;
        let email = value.to_lowercase();

        if !EMAIL_PATTERN.is_match(&email) {
            self.push_error(
                row,
                field.as_str(),
                format!("Invalid email format: {}", email),
                Some(value),
            );
            return None;
        }

        Some(email)
    }

    fn validate_url(&mut self, raw: Option<&str>, field: Field, row: usize) -> Option<String> {
        let value = non_blank(raw)?;

        let url = if value.starts_with("http://") || value.starts_with("https://") {
            value.to_string()
        } else {
            format!("https://{}", value)
        };

        if !URL_PATTERN.is_match(&url) {
            self.push_error(
                row,
                field.as_str(),
                format!("Invalid URL format: {}", url),
                Some(value),
            );
            return None;
        }

        if url.chars().count() > MAX_URL_CHARS {
            self.push_warning(
                row,
                field.as_str(),
                format!("URL truncated to {} characters", MAX_URL_CHARS),
                None,
            );
            return Some(url.chars().take(MAX_URL_CHARS).collect());
        }

        Some(url)
    }

    // ========================================================================
    // CROSS-FIELD RULES
    // ========================================================================

    fn check_date_order(&mut self, clean: &CleanAtiRequest, row: usize) {
        let Some(submission) = clean.submission_date else {
            return;
        };

        if clean.due_date.is_some_and(|due| due < submission) {
            self.push_error(
                row,
                Field::DueDate.as_str(),
                "Due date cannot be before submission date",
                None,
            );
        }

        if clean.completion_date.is_some_and(|done| done < submission) {
            self.push_error(
                row,
                Field::CompletionDate.as_str(),
                "Completion date cannot be before submission date",
                None,
            );
        }
    }

    fn check_page_counts(&mut self, clean: &CleanAtiRequest, row: usize) {
        if let (Some(processed), Some(disclosed)) = (clean.pages_processed, clean.pages_disclosed) {
            if disclosed > processed {
                self.push_warning(
                    row,
                    Field::PagesDisclosed.as_str(),
                    format!(
                        "Pages disclosed ({}) exceeds pages processed ({})",
                        disclosed, processed
                    ),
                    None,
                );
            }
        }
    }

    // ========================================================================
    // FINDINGS
    // ========================================================================

    fn push_error(&mut self, row: usize, field: &str, message: impl Into<String>, raw: Option<&str>) {
        self.errors.push(finding(row, field, message, Severity::Error, raw));
    }

    fn push_warning(&mut self, row: usize, field: &str, message: impl Into<String>, raw: Option<&str>) {
        if self.strict_mode {
            self.errors.push(finding(row, field, message, Severity::Error, raw));
        } else {
            self.warnings.push(finding(row, field, message, Severity::Warning, raw));
        }
    }
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new(false)
    }
}

fn finding(
    row: usize,
    field: &str,
    message: impl Into<String>,
    severity: Severity,
    raw: Option<&str>,
) -> RecordError {
    let error = RecordError::new(row, Some(field), message, severity);
    match raw {
        Some(raw) => error.with_raw_value(raw),
        None => error,
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================
