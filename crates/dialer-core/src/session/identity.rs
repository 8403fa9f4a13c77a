use crate::provider::{CredentialGrant, OperatorRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Short-lived access credential
#[derive(Clone, PartialEq, Serialize)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Utc::now(),
        }
    }
}

// tokens stay out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// The logged-in operator. Replaced wholesale on every credential refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorIdentity {
    pub name: String,
    pub phone_number: Option<String>,
    pub identity: Option<String>,
    pub credential: Credential,
}

impl OperatorIdentity {
    pub fn from_login(record: &OperatorRecord, grant: CredentialGrant) -> Self {
        Self {
            name: record.name.clone(),
            phone_number: record.number.clone().or(grant.number),
            identity: grant.identity,
            credential: Credential::new(grant.token),
        }
    }

    /// Same operator with a new credential
    pub fn with_credential(&self, grant: CredentialGrant) -> Self {
        Self {
            name: self.name.clone(),
            phone_number: self.phone_number.clone().or(grant.number),
            identity: grant.identity.or_else(|| self.identity.clone()),
            credential: Credential::new(grant.token),
        }
    }

    pub fn token(&self) -> &str {
        &self.credential.token
    }
}
