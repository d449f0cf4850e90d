use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use common_auth::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};

use crate::tokens::IssuedToken;

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub domain: String,
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            secure: false,
        }
    }
}

impl CookieConfig {
    fn build(&self, name: &'static str, token: &IssuedToken) -> Cookie<'static> {
        Cookie::build((name, token.token.clone()))
            .domain(self.domain.clone())
            .path("/")
            .same_site(SameSite::Strict)
            .http_only(true)
            .secure(self.secure)
            .max_age(time::Duration::seconds(token.max_age_seconds))
            .build()
    }

    fn removal(&self, name: &'static str) -> Cookie<'static> {
        let mut cookie = Cookie::build((name, ""))
            .domain(self.domain.clone())
            .path("/")
            .same_site(SameSite::Strict)
            .http_only(true)
            .secure(self.secure)
            .build();
        cookie.make_removal();
        cookie
    }
}

pub fn set_session_cookies(
    jar: CookieJar,
    config: &CookieConfig,
    access: &IssuedToken,
    refresh: &IssuedToken,
) -> CookieJar {
    jar.add(config.build(ACCESS_TOKEN_COOKIE, access))
        .add(config.build(REFRESH_TOKEN_COOKIE, refresh))
}

/// Expires both session cookies on the client, whether or not the request carried them.
pub fn clear_session_cookies(jar: CookieJar, config: &CookieConfig) -> CookieJar {
    jar.add(config.removal(ACCESS_TOKEN_COOKIE))
        .add(config.removal(REFRESH_TOKEN_COOKIE))
}
