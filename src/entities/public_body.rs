// 🏛️ Public Body Entity - stable identity + name/abbreviation matching
//
// "Treasury Board Secretariat", "treasury board secretariat", "TBS"
// → all resolve to the same public body UUID

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// PUBLIC BODY ENTITY
// ============================================================================

/// Public Body Entity
///
/// Identity: UUID (never changes)
/// Natural key: name, unique case-insensitively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicBody {
    pub id: Uuid,

    /// Official name
    pub name: String,

    /// Short form, e.g. "TBS"
    pub abbreviation: Option<String>,

    /// Mandate
    pub description: Option<String>,

    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublicBody {
    /// Create new public body entity with UUID
    pub fn new(fields: NewPublicBody) -> Self {
        let now = Utc::now();

        PublicBody {
            id: Uuid::new_v4(),
            name: fields.name,
            abbreviation: fields.abbreviation,
            description: fields.description,
            contact_email: fields.contact_email,
            website_url: fields.website_url,
            is_active: fields.is_active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if a string names this body (name or abbreviation, case-insensitive)
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim().to_lowercase();

        self.lookup_keys().iter().any(|k| *k == key)
    }

    /// Lower-cased keys this body can be found under
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = vec![self.name.trim().to_lowercase()];
        if let Some(abbreviation) = &self.abbreviation {
            let abbreviation = abbreviation.trim().to_lowercase();
            if !abbreviation.is_empty() && !keys.contains(&abbreviation) {
                keys.push(abbreviation);
            }
        }
        keys
    }

    /// Overlay a patch: only fields carrying a value overwrite, and
    /// `is_active` can be raised but never cleared
    pub fn apply_patch(&mut self, patch: &PublicBodyPatch) {
        if let Some(abbreviation) = &patch.abbreviation {
            self.abbreviation = Some(abbreviation.clone());
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(email) = &patch.contact_email {
            self.contact_email = Some(email.clone());
        }
        if let Some(url) = &patch.website_url {
            self.website_url = Some(url.clone());
        }
        if patch.is_active {
            self.is_active = true;
        }

        self.updated_at = Utc::now();
    }
}

/// Fields required to create a public body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPublicBody {
    pub name: String,
    pub abbreviation: Option<String>,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,
}

impl NewPublicBody {
    pub fn named(name: &str) -> Self {
        NewPublicBody {
            name: name.to_string(),
            abbreviation: None,
            description: None,
            contact_email: None,
            website_url: None,
            is_active: true,
        }
    }
}

/// Partial update for an existing public body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicBodyPatch {
    pub abbreviation: Option<String>,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub website_url: Option<String>,
    pub is_active: bool,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn treasury() -> PublicBody {
        PublicBody::new(NewPublicBody {
            abbreviation: Some("TBS".to_string()),
            ..NewPublicBody::named("Treasury Board Secretariat")
        })
    }

    #[test]
    fn test_public_body_creation() {
        let body = treasury();

        assert!(!body.id.is_nil());
        assert_eq!(body.name, "Treasury Board Secretariat");
        assert!(body.is_active);
        assert_eq!(body.created_at, body.updated_at);
    }

    #[test]
    fn test_matches_name_and_abbreviation() {
        let body = treasury();

        assert!(body.matches("treasury board secretariat"));
        assert!(body.matches("  TREASURY BOARD SECRETARIAT "));
        assert!(body.matches("tbs"));
        // Exact keys only, no substring matching
        assert!(!body.matches("Treasury"));
        assert!(!body.matches("Unknown Agency"));
    }

    #[test]
    fn test_lookup_keys() {
        assert_eq!(
            treasury().lookup_keys(),
            vec!["treasury board secretariat".to_string(), "tbs".to_string()]
        );
        let plain = PublicBody::new(NewPublicBody::named("Health Canada"));
        assert_eq!(plain.lookup_keys(), vec!["health canada".to_string()]);
    }

    #[test]
    fn test_apply_patch() {
        let mut body = treasury();
        body.is_active = false;

        body.apply_patch(&PublicBodyPatch {
            contact_email: Some("ati@tbs.gc.ca".to_string()),
            ..PublicBodyPatch::default()
        });

        assert_eq!(body.abbreviation.as_deref(), Some("TBS"));
        assert_eq!(body.contact_email.as_deref(), Some("ati@tbs.gc.ca"));
        // A false flag leaves the current value alone
        assert!(!body.is_active);

        body.apply_patch(&PublicBodyPatch {
            is_active: true,
            ..PublicBodyPatch::default()
        });
        assert!(body.is_active);
    }
}
