//! Session authentication.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::credentials::{CredentialStore, UserRecord};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Issuer claim on session tokens.
pub const SESSION_ISSUER: &str = "vizgate";

/// Audience claim on session tokens.
pub const SESSION_AUDIENCE: &str = "vizgate-portal";

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Session JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (numeric user ID as a string).
    pub sub: String,
    /// Login name.
    pub username: String,
    /// Issued at (Unix timestamp).
    pub iat: u64,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
    /// Issuer.
    pub iss: String,
    /// Audience.
    pub aud: String,
}

impl SessionClaims {
    /// Create claims for a user, issued at `now`.
    ///
    /// Returns `None` when the expiry does not fit in a timestamp.
    pub fn new(user: &UserRecord, now: u64, expiry_seconds: u64) -> Option<Self> {
        Some(Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iat: now,
            exp: now.checked_add(expiry_seconds)?,
            iss: SESSION_ISSUER.to_string(),
            aud: SESSION_AUDIENCE.to_string(),
        })
    }

    /// A token is expired from its `exp` second onwards.
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp <= now
    }
}

/// The verified caller of a protected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: u64,
    pub username: String,
    #[serde(rename = "iat")]
    pub issued_at: u64,
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

impl TryFrom<SessionClaims> for Identity {
    type Error = AppError;

    fn try_from(claims: SessionClaims) -> AppResult<Self> {
        let id = claims.sub.parse().map_err(|_| {
            debug!("Session token subject is not a user id: {}", claims.sub);
            AppError::unauthorized()
        })?;

        Ok(Self {
            id,
            username: claims.username,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}

/// Issues and verifies session tokens.
pub struct SessionService {
    store: CredentialStore,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: u64,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("store", &self.store)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl SessionService {
    /// Create a session service. Fails if no signing secret is configured.
    pub fn new(store: CredentialStore, config: &AuthConfig) -> AppResult<Self> {
        let secret = config
            .session_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration("session secret not configured".to_string()))?;

        Ok(Self {
            store,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: config.session_expiry,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Check credentials and issue a session token.
    pub fn login(&self, username: &str, password: &str) -> AppResult<String> {
        let Some(user) = self.store.verify(username, password) else {
            warn!(username = %username, "Login rejected");
            return Err(AppError::Authentication("invalid credentials".to_string()));
        };

        let token = self.issue_at(user, unix_now())?;
        info!(user_id = user.id, username = %user.username, "Login succeeded");
        Ok(token)
    }

    /// Sign a session token for `user` issued at `now`.
    pub fn issue_at(&self, user: &UserRecord, now: u64) -> AppResult<String> {
        let claims = SessionClaims::new(user, now, self.expiry).ok_or_else(|| {
            AppError::Configuration(format!("session expiry {}s is out of range", self.expiry))
        })?;
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign session token: {e}")))
    }

    /// Validate a session token against the current time.
    pub fn verify(&self, token: &str) -> AppResult<Identity> {
        self.verify_at(token, unix_now())
    }

    /// Validate a session token against `now`.
    ///
    /// Signature, algorithm, issuer and audience are checked by the JWT
    /// library; expiry is checked here against `now` with no leeway.
    pub fn verify_at(&self, token: &str, now: u64) -> AppResult<Identity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.set_audience(&[SESSION_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!("Session token rejected: {}", e);
                AppError::unauthorized()
            })?
            .claims;

        if claims.is_expired_at(now) {
            debug!(username = %claims.username, "Session token expired");
            return Err(AppError::unauthorized());
        }

        Identity::try_from(claims)
    }
}

/// Extract authorization from request headers.
pub fn extract_auth_header(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Parse Bearer token from Authorization header.
pub fn parse_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid session token; the verified [`Identity`] is added to the
/// request extensions.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_auth_header(request.headers())
        .and_then(parse_bearer_token)
        .ok_or_else(|| {
            debug!(path = %request.uri().path(), "No bearer token provided");
            AppError::unauthorized()
        })?;

    let identity = state.sessions.verify(token)?;
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;

    fn service_with_secret(secret: &str) -> SessionService {
        let config = AuthConfig {
            session_secret: Some(secret.to_string()),
            ..AuthConfig::default()
        };
        let store = CredentialStore::from_config(&config.users).unwrap();
        SessionService::new(store, &config).unwrap()
    }

    fn service() -> SessionService {
        service_with_secret("test-session-secret")
    }

    #[test]
    fn test_login_then_verify() {
        let sessions = service();
        let token = sessions.login("admin", "password").unwrap();

        let identity = sessions.verify(&token).unwrap();
        assert_eq!(identity.id, 1);
        assert_eq!(identity.username, "admin");
        assert_eq!(identity.expires_at - identity.issued_at, 86400);
    }

    #[test]
    fn test_login_rejects_bad_credentials() {
        let sessions = service();
        for (user, pass) in [("admin", "wrong"), ("root", "password"), ("", "")] {
            let err = sessions.login(user, pass).unwrap_err();
            assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let sessions = service();
        let user = sessions.store().get("admin").unwrap().clone();
        let issued = 1_700_000_000;
        let token = sessions.issue_at(&user, issued).unwrap();

        assert!(sessions.verify_at(&token, issued).is_ok());
        assert!(sessions.verify_at(&token, issued + 86399).is_ok());
        assert!(sessions.verify_at(&token, issued + 86400).is_err());
        assert!(sessions.verify_at(&token, issued + 90000).is_err());
    }

    #[test]
    fn test_oversized_expiry_is_configuration_error() {
        let config = AuthConfig {
            session_secret: Some("test-session-secret".to_string()),
            session_expiry: u64::MAX,
            ..AuthConfig::default()
        };
        let store = CredentialStore::from_config(&config.users).unwrap();
        let sessions = SessionService::new(store, &config).unwrap();

        let err = sessions.login("admin", "password").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert_eq!(
            err.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rejects_foreign_and_malformed_tokens() {
        let sessions = service();
        let other = service_with_secret("another-secret");
        let foreign = other.login("admin", "password").unwrap();

        assert!(sessions.verify(&foreign).is_err());
        assert!(sessions.verify("not.a.jwt").is_err());
        assert!(sessions.verify("").is_err());

        let token = sessions.login("admin", "password").unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(sessions.verify(&tampered).is_err());
    }

    #[test]
    fn test_rejects_unsigned_token() {
        let sessions = service();
        let token = sessions.login("admin", "password").unwrap();
        let mut parts = token.split('.');
        let (_, payload) = (parts.next().unwrap(), parts.next().unwrap());
        // {"alg":"none","typ":"JWT"}
        let unsigned = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{payload}.");
        assert!(sessions.verify(&unsigned).is_err());
    }

    #[test]
    fn test_rejects_wrong_audience() {
        let sessions = service();
        let claims = serde_json::json!({
            "sub": "1", "username": "admin", "iat": unix_now(), "exp": unix_now() + 60,
            "iss": SESSION_ISSUER, "aud": "tableau"
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-session-secret"),
        )
        .unwrap();
        assert!(sessions.verify(&token).is_err());
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        let config = AuthConfig {
            users: vec![UserConfig {
                id: 1,
                username: "a".into(),
                password: Some("b".into()),
                password_hash: None,
            }],
            ..AuthConfig::default()
        };
        let store = CredentialStore::from_config(&config.users).unwrap();
        assert!(matches!(
            SessionService::new(store, &config),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_bearer_token() {
        assert_eq!(parse_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer_token("bearer abc123"), Some("abc123"));
        assert_eq!(parse_bearer_token("Bearer "), None);
        assert_eq!(parse_bearer_token("Basic abc123"), None);
    }
}
