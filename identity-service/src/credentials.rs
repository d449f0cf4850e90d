use anyhow::{Context, Result};
use tracing::warn;

/// Work factor for newly stored hashes.
pub const DEFAULT_COST: u32 = 10;

/// bcrypt hashing and verification of user passwords.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    cost: u32,
    decoy_hash: String,
}

impl CredentialHasher {
    pub fn new() -> Result<Self> {
        Self::with_cost(DEFAULT_COST)
    }

    pub fn with_cost(cost: u32) -> Result<Self> {
        // Compared against when the email is unknown so both login failures cost the same.
        let decoy_hash = bcrypt::hash("decoy-password", cost).context("Failed to hash password")?;
        Ok(Self { cost, decoy_hash })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn hash(&self, plaintext: &str) -> Result<String> {
        bcrypt::hash(plaintext, self.cost).context("Failed to hash password")
    }

    /// A malformed stored hash never matches.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match bcrypt::verify(plaintext, hash) {
            Ok(matches) => matches,
            Err(err) => {
                warn!(?err, "stored password hash is malformed");
                false
            }
        }
    }

    pub fn burn_verification(&self, plaintext: &str) {
        let _ = bcrypt::verify(plaintext, &self.decoy_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn default_cost_produces_standard_bcrypt_hash() {
        let hasher = CredentialHasher::new().unwrap();
        let hash = hasher.hash("pass").unwrap();
        assert_eq!(hash.len(), 60);
        assert!(hash.starts_with("$2b$10$"));
        assert!(Regex::new(r"^\$2[ab]\$\d+\$").unwrap().is_match(&hash));
    }

    #[test]
    fn verify_matches_only_the_original_password() {
        let hasher = CredentialHasher::with_cost(4).unwrap();
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("correct horse ", &hash));
        assert!(!hasher.verify("", &hash));
    }

    #[test]
    fn hashing_is_salted() {
        let hasher = CredentialHasher::with_cost(4).unwrap();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        let hasher = CredentialHasher::with_cost(4).unwrap();
        assert!(!hasher.verify("pass", "not-a-bcrypt-hash"));
        assert!(!hasher.verify("pass", ""));
    }

    #[test]
    fn hashes_from_other_costs_still_verify() {
        let strong = CredentialHasher::with_cost(5).unwrap();
        let weak = CredentialHasher::with_cost(4).unwrap();
        let hash = strong.hash("pass").unwrap();
        assert!(weak.verify("pass", &hash));
    }
}
