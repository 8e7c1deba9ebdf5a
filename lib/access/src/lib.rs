//! Principals, bearer tokens, and access checks for portcullis.
//!
//! This crate provides:
//! - The authenticated `Principal` with its `RoleSet` and status
//! - `TokenService`, which mints, verifies, and refreshes access/refresh tokens
//! - `AccessGuard`, the per-request authentication and role checks
//! - `ProviderCapability` and the `IdentityProvider` boundary for login
//! - The `AuthError` taxonomy shared by all of the above
//!
//! # Example
//!
//! ```
//! use portcullis_access::{AccessGuard, Principal, Role, RoleSet, TokenConfig, TokenService};
//!
//! let tokens = TokenService::new(&TokenConfig::new("secret".to_string())).unwrap();
//! let admin = Principal::from_email("root@example.com").with_roles(RoleSet::admin());
//! let pair = tokens.mint(&admin).unwrap();
//!
//! let guard = AccessGuard::new(tokens);
//! let header = format!("Bearer {}", pair.access_token);
//! let principal = guard.require_role(Some(&header), &[Role::Admin]).unwrap();
//! assert_eq!(principal.email(), "root@example.com");
//! ```

pub mod authorize;
pub mod error;
pub mod guard;
pub mod principal;
pub mod provider;
pub mod role;
pub mod token;

pub use authorize::{AuthorizationRequest, ProviderCapability, generate_state};
pub use error::AuthError;
pub use guard::{AccessGuard, bearer_token, ensure_active, ensure_role};
pub use principal::{NewPrincipal, Principal, PrincipalStatus, PrincipalUpdate};
pub use provider::{IdentityClaims, IdentityProvider, ProviderConfig, ProviderError};
pub use role::{Role, RoleSet};
pub use token::{Claims, TokenConfig, TokenPair, TokenService, TokenType};
