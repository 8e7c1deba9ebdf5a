//! The authenticated principal.
//!
//! A principal is rebuilt from verified token claims on every request and is
//! never persisted here. The email address is the identity key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::role::RoleSet;

/// Account status of a principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalStatus {
    /// Account in good standing.
    #[default]
    Active,
    /// Account switched off by its owner or an admin.
    Inactive,
    /// Account blocked by an admin.
    Suspended,
}

/// An authenticated identity with its roles and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Application-side identifier, when one exists.
    id: Option<String>,
    /// Email address; unique identity key.
    email: String,
    /// Display name.
    name: String,
    /// Granted roles; never empty.
    #[serde(default)]
    roles: RoleSet,
    /// Account status.
    #[serde(default)]
    status: PrincipalStatus,
    /// When the account was created, if known.
    created_at: Option<DateTime<Utc>>,
    /// When the principal last completed a provider login, if known.
    last_login: Option<DateTime<Utc>>,
    /// Profile picture URL.
    avatar_url: Option<String>,
    /// Object ID assigned by the identity provider (`oid` claim).
    provider_object_id: Option<String>,
    /// Tenant of the identity provider (`tid` claim).
    tenant_id: Option<String>,
}

impl Principal {
    /// Creates an active principal with the default `{user}` role set.
    #[must_use]
    pub fn new(email: String, name: String) -> Self {
        Self {
            id: None,
            email,
            name,
            roles: RoleSet::default(),
            status: PrincipalStatus::Active,
            created_at: None,
            last_login: None,
            avatar_url: None,
            provider_object_id: None,
            tenant_id: None,
        }
    }

    /// Creates a principal from an email alone, named after its local part.
    #[must_use]
    pub fn from_email(email: &str) -> Self {
        Self::new(email.to_string(), local_part(email).to_string())
    }

    /// Sets the role set.
    #[must_use]
    pub fn with_roles(mut self, roles: RoleSet) -> Self {
        self.roles = roles;
        self
    }

    /// Sets the account status.
    #[must_use]
    pub fn with_status(mut self, status: PrincipalStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the provider-side identifiers.
    #[must_use]
    pub fn with_provider_ids(
        mut self,
        provider_object_id: Option<String>,
        tenant_id: Option<String>,
    ) -> Self {
        self.provider_object_id = provider_object_id;
        self.tenant_id = tenant_id;
        self
    }

    /// Sets the last login time.
    #[must_use]
    pub fn with_last_login(mut self, at: DateTime<Utc>) -> Self {
        self.last_login = Some(at);
        self
    }

    /// Returns the application-side identifier, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the role set.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Returns the account status.
    #[must_use]
    pub fn status(&self) -> PrincipalStatus {
        self.status
    }

    /// Returns true if the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }

    /// Returns when the account was created, if known.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns the last login time, if known.
    #[must_use]
    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }

    /// Returns the avatar URL, if any.
    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }

    /// Returns the provider object ID, if any.
    #[must_use]
    pub fn provider_object_id(&self) -> Option<&str> {
        self.provider_object_id.as_deref()
    }

    /// Returns the provider tenant ID, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Applies a partial update, returning the updated principal.
    #[must_use]
    pub fn updated(mut self, update: PrincipalUpdate) -> Self {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(roles) = update.roles {
            self.roles = roles;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self
    }
}

/// Returns the part of an email address before the `@`.
#[must_use]
pub fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Partial update of a principal's mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalUpdate {
    pub name: Option<String>,
    pub roles: Option<RoleSet>,
    pub status: Option<PrincipalStatus>,
}

/// Request to create a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrincipal {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub roles: RoleSet,
}

impl NewPrincipal {
    /// Validates the request and builds the principal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the email is not a plausible address or
    /// the name is blank.
    pub fn into_principal(self) -> Result<Principal, AuthError> {
        if !is_plausible_email(&self.email) {
            return Err(AuthError::InvalidRequest {
                reason: "Invalid email address".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(AuthError::InvalidRequest {
                reason: "Name must not be empty".to_string(),
            });
        }
        let mut principal = Principal::new(self.email, self.name).with_roles(self.roles);
        principal.created_at = Some(Utc::now());
        Ok(principal)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && domain.contains('.')
        }
        None => false,
    }
}
