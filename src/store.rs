// 🗄️ Persistence collaborator - what the ingestion core needs from storage
//
// The orchestrator only ever talks to these traits. db::SqliteStore is the
// shipped implementation; tests can swap in anything that implements them.

use crate::entities::{
    AtiRequest, AtiRequestPatch, NewAtiRequest, NewPublicBody, PublicBody, PublicBodyPatch,
};
use anyhow::Result;

pub trait PublicBodyStore {
    /// Natural key lookup (case-insensitive)
    fn find_public_body_by_name(&self, name: &str) -> Result<Option<PublicBody>>;

    /// Secondary key lookup (case-insensitive)
    fn find_public_body_by_abbreviation(&self, abbreviation: &str) -> Result<Option<PublicBody>>;

    fn list_public_bodies(&self) -> Result<Vec<PublicBody>>;

    fn create_public_body(&self, fields: NewPublicBody) -> Result<PublicBody>;

    fn update_public_body(&self, existing: &PublicBody, patch: &PublicBodyPatch) -> Result<PublicBody>;
}

pub trait AtiRequestStore {
    fn find_ati_request_by_number(&self, request_number: &str) -> Result<Option<AtiRequest>>;

    fn create_ati_request(&self, fields: NewAtiRequest) -> Result<AtiRequest>;

    fn update_ati_request(&self, existing: &AtiRequest, patch: &AtiRequestPatch) -> Result<AtiRequest>;
}

/// Transaction boundary for one ingestion run
///
/// `flush` stages work without making it durable; only `commit` does.
pub trait UnitOfWork {
    fn begin(&self) -> Result<()>;
    fn flush(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

/// Everything an ingestion run needs
pub trait IngestStore: PublicBodyStore + AtiRequestStore + UnitOfWork {}

impl<T: PublicBodyStore + AtiRequestStore + UnitOfWork> IngestStore for T {}
