//! Basic Auth gate for the admin WebSocket role.
//!
//! Only `/ws?role=admin` upgrades are challenged; everything else
//! passes through untouched. Credentials come from ADMIN_USERNAME and
//! ADMIN_PASSWORD; with either missing the gate stays open and logs
//! loudly on every admin upgrade.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};
use std::sync::Arc;

/// The expected admin credential pair.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Both fields are checked unconditionally, in constant time, so a
    /// rejection does not leak which of the two was wrong.
    fn matches(&self, username: &str, password: &str) -> bool {
        eq_constant_time(&self.username, username) & eq_constant_time(&self.password, password)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    credentials: Option<Credentials>,
}

impl AuthConfig {
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable
    /// the gate.
    pub fn from_env() -> Self {
        fn read(key: &str) -> Option<String> {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        match (read("ADMIN_USERNAME"), read("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => {
                tracing::info!("Admin authentication enabled");
                Self {
                    credentials: Some(Credentials { username, password }),
                }
            }
            (None, None) => {
                tracing::warn!("Admin authentication DISABLED - anyone can connect as admin!");
                Self::default()
            }
            _ => {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable authentication"
                );
                Self::default()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Byte-wise comparison whose running time depends only on the input
/// lengths, never on where the first mismatch sits.
fn eq_constant_time(expected: &str, supplied: &str) -> bool {
    let expected = expected.as_bytes();
    let supplied = supplied.as_bytes();
    let mut diff = expected.len() ^ supplied.len();
    for i in 0..expected.len().min(supplied.len()) {
        diff |= usize::from(expected[i] ^ supplied[i]);
    }
    diff == 0
}

fn is_admin_upgrade(uri: &Uri) -> bool {
    uri.path() == "/ws"
        && uri
            .query()
            .unwrap_or_default()
            .split('&')
            .any(|pair| pair == "role=admin")
}

/// Middleware challenging admin WebSocket upgrades with HTTP Basic
/// Auth. This prevents clients from taking over by connecting to
/// `/ws?role=admin`.
pub async fn admin_ws_auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_admin_upgrade(request.uri()) {
        return next.run(request).await;
    }

    let Some(expected) = &auth.credentials else {
        tracing::warn!(
            "Admin WebSocket requested but authentication is DISABLED; set ADMIN_USERNAME and ADMIN_PASSWORD to prevent takeover"
        );
        return next.run(request).await;
    };

    match request.headers().typed_get::<Authorization<Basic>>() {
        Some(Authorization(basic)) if expected.matches(basic.username(), basic.password()) => {
            next.run(request).await
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"pickban admin\"")],
            "Unauthorized",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(username: &str, password: &str) -> AuthConfig {
        AuthConfig {
            credentials: Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
        }
    }

    #[test]
    fn test_is_admin_upgrade() {
        let admin: Uri = "/ws?role=admin&x=1".parse().unwrap();
        assert!(is_admin_upgrade(&admin));

        let member: Uri = "/ws?role=member".parse().unwrap();
        assert!(!is_admin_upgrade(&member));

        let other_path: Uri = "/api/lobbies?role=admin".parse().unwrap();
        assert!(!is_admin_upgrade(&other_path));

        let bare: Uri = "/ws".parse().unwrap();
        assert!(!is_admin_upgrade(&bare));
    }

    #[test]
    fn test_credentials_match() {
        let config = enabled("admin", "secret");
        let creds = config.credentials.as_ref().unwrap();
        assert!(creds.matches("admin", "secret"));
        assert!(!creds.matches("admin", "wrong"));
        assert!(!creds.matches("wrong", "secret"));
        assert!(!creds.matches("", ""));
    }

    #[test]
    fn test_config_enablement() {
        assert!(!AuthConfig::default().is_enabled());
        assert!(enabled("u", "p").is_enabled());
    }

    #[test]
    fn test_eq_constant_time() {
        assert!(eq_constant_time("hello", "hello"));
        assert!(!eq_constant_time("hello", "world"));
        assert!(!eq_constant_time("hello", "hell"));
        assert!(eq_constant_time("", ""));
    }

    #[test]
    fn test_typed_header_extraction() {
        // "admin:secret" base64-encoded
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            "Basic YWRtaW46c2VjcmV0".parse().unwrap(),
        );
        let auth = headers.typed_get::<Authorization<Basic>>().unwrap();
        assert_eq!(auth.0.username(), "admin");
        assert_eq!(auth.0.password(), "secret");
    }
}
