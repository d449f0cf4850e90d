/// Expected `iss`/`aud` values shared by the access and refresh verifiers.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    /// Seconds past `exp` a token is still honoured. Zero unless a caller opts in.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    /// Expiry is enforced to the second.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 0,
        }
    }
}
