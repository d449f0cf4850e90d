pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod jwks;
pub mod roles;
pub mod verifier;

pub use claims::{Claims, IdentityClaims, RefreshClaims};
pub use config::JwtConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::{AuthContext, RefreshContext, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
pub use guards::{ensure_role, AdminOnly, GuardError, RequireRole, RoleSet};
pub use jwks::{Jwk, JwkSet, JwksFetcher};
pub use roles::{Role, UnknownRole, ROLE_ADMIN, ROLE_CUSTOMER, ROLE_MANAGER};
pub use verifier::{InMemoryKeyStore, JwtVerifier, JwtVerifierBuilder, RefreshVerifier};
