// Entity Models
//
// Each entity has:
// - Stable identity (UUID) that never changes
// - A natural key used for duplicate detection during ingestion
// - A patch type carrying partial updates

pub mod ati_request;
pub mod public_body;

pub use ati_request::{
    AtiRequest, AtiRequestPatch, NewAtiRequest, RequestOutcome, RequestStatus, RequestType,
};
pub use public_body::{NewPublicBody, PublicBody, PublicBodyPatch};
