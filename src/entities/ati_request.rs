// 📨 ATI Request Entity - one tracked Access-to-Information request
//
// Natural key: request_number (unique across all public bodies)
// Identity: UUID assigned at creation, never changes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// REQUEST STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Received,
    InProgress,
    PendingClarification,
    Extended,
    Completed,
    Abandoned,
    Transferred,
}

impl RequestStatus {
    /// Declaration order; fuzzy matching walks this list front to back
    pub const ALL: [RequestStatus; 7] = [
        RequestStatus::Received,
        RequestStatus::InProgress,
        RequestStatus::PendingClarification,
        RequestStatus::Extended,
        RequestStatus::Completed,
        RequestStatus::Abandoned,
        RequestStatus::Transferred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Received => "received",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::PendingClarification => "pending_clarification",
            RequestStatus::Extended => "extended",
            RequestStatus::Completed => "completed",
            RequestStatus::Abandoned => "abandoned",
            RequestStatus::Transferred => "transferred",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == code)
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Received
    }
}

// ============================================================================
// REQUEST TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Requester's own personal information
    Personal,
    /// General records
    NonPersonal,
    Mixed,
    /// Correction of personal information
    Correction,
}

impl RequestType {
    pub const ALL: [RequestType; 4] = [
        RequestType::Personal,
        RequestType::NonPersonal,
        RequestType::Mixed,
        RequestType::Correction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Personal => "personal",
            RequestType::NonPersonal => "non_personal",
            RequestType::Mixed => "mixed",
            RequestType::Correction => "correction",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == code)
    }
}

impl Default for RequestType {
    fn default() -> Self {
        RequestType::NonPersonal
    }
}

// ============================================================================
// REQUEST OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    FullDisclosure,
    PartialDisclosure,
    NoDisclosure,
    NoRecordsExist,
    Transferred,
    Abandoned,
    Withdrawn,
    Pending,
}

impl RequestOutcome {
    pub const ALL: [RequestOutcome; 8] = [
        RequestOutcome::FullDisclosure,
        RequestOutcome::PartialDisclosure,
        RequestOutcome::NoDisclosure,
        RequestOutcome::NoRecordsExist,
        RequestOutcome::Transferred,
        RequestOutcome::Abandoned,
        RequestOutcome::Withdrawn,
        RequestOutcome::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::FullDisclosure => "full_disclosure",
            RequestOutcome::PartialDisclosure => "partial_disclosure",
            RequestOutcome::NoDisclosure => "no_disclosure",
            RequestOutcome::NoRecordsExist => "no_records_exist",
            RequestOutcome::Transferred => "transferred",
            RequestOutcome::Abandoned => "abandoned",
            RequestOutcome::Withdrawn => "withdrawn",
            RequestOutcome::Pending => "pending",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|o| o.as_str() == code)
    }
}

impl Default for RequestOutcome {
    fn default() -> Self {
        RequestOutcome::Pending
    }
}

macro_rules! display_as_code {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_code!(RequestStatus, RequestType, RequestOutcome);

// ============================================================================
// ATI REQUEST ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtiRequest {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    pub id: Uuid,
    pub request_number: String,
    pub public_body_id: Uuid,

    // ========================================================================
    // TIMELINE
    // ========================================================================
    pub submission_date: NaiveDate,
    pub due_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub extension_days: i64,

    // ========================================================================
    // CLASSIFICATION
    // ========================================================================
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub outcome: RequestOutcome,

    // ========================================================================
    // DISCLOSURE
    // ========================================================================
    pub pages_processed: Option<i64>,
    pub pages_disclosed: Option<i64>,
    pub fees_charged: Option<f64>,
    pub is_deemed_refusal: bool,
    pub summary: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AtiRequest {
    /// Build a fresh entity with a new UUID
    pub fn new(fields: NewAtiRequest) -> Self {
        let now = Utc::now();

        AtiRequest {
            id: Uuid::new_v4(),
            request_number: fields.request_number,
            public_body_id: fields.public_body_id,
            submission_date: fields.submission_date,
            due_date: fields.due_date,
            completion_date: fields.completion_date,
            extension_days: fields.extension_days,
            request_type: fields.request_type,
            status: fields.status,
            outcome: fields.outcome,
            pages_processed: fields.pages_processed,
            pages_disclosed: fields.pages_disclosed,
            fees_charged: fields.fees_charged,
            is_deemed_refusal: fields.is_deemed_refusal,
            summary: fields.summary,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overlay a patch: only fields carrying a value overwrite, and the
    /// deemed-refusal flag can be raised but never cleared
    pub fn apply_patch(&mut self, patch: &AtiRequestPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(outcome) = patch.outcome {
            self.outcome = outcome;
        }
        if let Some(completion_date) = patch.completion_date {
            self.completion_date = Some(completion_date);
        }
        if let Some(extension_days) = patch.extension_days {
            self.extension_days = extension_days;
        }
        if let Some(pages) = patch.pages_processed {
            self.pages_processed = Some(pages);
        }
        if let Some(pages) = patch.pages_disclosed {
            self.pages_disclosed = Some(pages);
        }
        if let Some(fees) = patch.fees_charged {
            self.fees_charged = Some(fees);
        }
        if patch.is_deemed_refusal {
            self.is_deemed_refusal = true;
        }
        if let Some(summary) = &patch.summary {
            self.summary = Some(summary.clone());
        }

        self.updated_at = Utc::now();
    }
}

/// Fields required to create an ATI request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAtiRequest {
    pub request_number: String,
    pub public_body_id: Uuid,
    pub submission_date: NaiveDate,
    pub due_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub extension_days: i64,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub outcome: RequestOutcome,
    pub pages_processed: Option<i64>,
    pub pages_disclosed: Option<i64>,
    pub fees_charged: Option<f64>,
    pub is_deemed_refusal: bool,
    pub summary: Option<String>,
}

/// Partial update for an existing ATI request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtiRequestPatch {
    pub status: Option<RequestStatus>,
    pub outcome: Option<RequestOutcome>,
    pub completion_date: Option<NaiveDate>,
    pub extension_days: Option<i64>,
    pub pages_processed: Option<i64>,
    pub pages_disclosed: Option<i64>,
    pub fees_charged: Option<f64>,
    pub is_deemed_refusal: bool,
    pub summary: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
