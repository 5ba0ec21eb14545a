//! Acting identity passed into pipeline mutations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is performing an operation.
///
/// Authorization happens before the pipeline is called; the pipeline only
/// records the identity in audit facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActingIdentity {
    /// The acting user.
    pub user_id: Uuid,

    /// Display name, when the caller has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// The request ID (for request-scoped correlation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,

    /// The organization ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
}

impl ActingIdentity {
    /// Creates an identity for a user.
    #[must_use]
    pub const fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: None,
            request_id: None,
            org_id: None,
        }
    }

    /// Identity used for system-initiated work such as migrations.
    #[must_use]
    pub fn system() -> Self {
        Self::new(Uuid::nil()).with_display_name("system")
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Sets the request ID.
    #[must_use]
    pub const fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the organization ID.
    #[must_use]
    pub const fn with_org_id(mut self, org_id: Uuid) -> Self {
        self.org_id = Some(org_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_builder() {
        let user_id = Uuid::new_v4();
        let request_id = Uuid::new_v4();
        let identity = ActingIdentity::new(user_id)
            .with_display_name("Dana")
            .with_request_id(request_id);

        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.request_id, Some(request_id));
        assert!(identity.org_id.is_none());
    }

    #[test]
    fn test_system_identity() {
        let identity = ActingIdentity::system();
        assert!(identity.user_id.is_nil());
        assert_eq!(identity.display_name.as_deref(), Some("system"));
    }

    #[test]
    fn test_identity_serialization() {
        let identity = ActingIdentity::new(Uuid::new_v4()).with_org_id(Uuid::new_v4());
        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: ActingIdentity = serde_json::from_str(&json).unwrap();

        assert_eq!(identity, deserialized);
        assert!(!json.contains("requestId"));
    }
}
