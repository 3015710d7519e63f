// Session / authentication lifecycle.
//
// Owns the current token and account identity. Login stores the full
// response document — the stream handshake replays it verbatim, so a
// payload rebuilt from just the token would be rejected by the server.

use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;

/// Exact rejection-body signature the cloud uses to signal a 2FA
/// challenge. Any other 401/406 body is a plain authentication failure.
const TWO_FACTOR_SIGNATURE: &str =
    "InsufficientData:Personusestwofactorauthentication.Requirescode.";

// ── LoginPayload ─────────────────────────────────────────────────────

/// The full login response document.
///
/// `id` (the token) and `userId` are the only fields this crate reads;
/// everything else is captured via `#[serde(flatten)]` and preserved so
/// the document can be replayed verbatim as the stream credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginPayload {
    /// Authorization token, attached to every authorized call.
    pub id: String,

    /// Account user identifier, used for directory resolution.
    #[serde(rename = "userId")]
    pub user_id: String,

    /// All remaining fields the server sent. Opaque but required by the
    /// stream server's handshake.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Session ──────────────────────────────────────────────────────────

#[derive(Clone)]
struct Authenticated {
    token: String,
    user_id: String,
    payload: LoginPayload,
}

#[derive(Clone)]
struct StoredCredentials {
    email: String,
    password: SecretString,
}

/// Account session: either unauthenticated or holding exactly one
/// (token, userId, payload) triplet — the three are only ever written
/// together, from the same login response.
pub struct Session {
    http: reqwest::Client,
    base_url: Url,
    auth: RwLock<Option<Authenticated>>,
    credentials: RwLock<Option<StoredCredentials>>,
    /// Serializes silent re-logins: one in flight at a time; concurrent
    /// 401 handlers wait here and reuse the refreshed token.
    reauth: Mutex<()>,
}

impl Session {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            auth: RwLock::new(None),
            credentials: RwLock::new(None),
            reauth: Mutex::new(()),
        }
    }

    /// Authenticate with email/password, optionally carrying a 2FA code.
    ///
    /// `POST /Person/login?include=user`. A 401/406 whose body carries
    /// the exact 2FA signature maps to [`Error::TwoFactorRequired`];
    /// any other rejection, and any success response missing the
    /// identity fields, is [`Error::Authentication`]. On success the
    /// credentials are remembered for silent refresh.
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
        code: Option<&str>,
    ) -> Result<LoginPayload, Error> {
        let url = self.base_url.join("Person/login?include=user")?;
        debug!(email, "attempting login");

        let mut body = serde_json::json!({
            "email": email,
            "password": password.expose_secret(),
        });
        if let Some(code) = code {
            body["code"] = code.into();
        }

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(Error::Transport)?;

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::NOT_ACCEPTABLE
        {
            if text.contains(TWO_FACTOR_SIGNATURE) {
                info!("login requires a two-factor code");
                return Err(Error::TwoFactorRequired);
            }
            return Err(Error::Authentication {
                message: format!("login rejected (HTTP {status}): {text}"),
            });
        }

        if !status.is_success() {
            return Err(Error::Authentication {
                message: format!("login failed with HTTP {status}"),
            });
        }

        let payload: LoginPayload =
            serde_json::from_str(&text).map_err(|_| Error::Authentication {
                message: "login response missing id or userId".into(),
            })?;

        self.store(payload.clone());
        *self
            .credentials
            .write()
            .expect("session lock poisoned") = Some(StoredCredentials {
            email: email.to_owned(),
            password: password.clone(),
        });

        info!("login successful");
        Ok(payload)
    }

    /// Rebuild authenticated state from a previously stored payload.
    ///
    /// No network call; infallible — the payload was produced by a
    /// successful login, and deserializing it already enforced the
    /// identity fields.
    pub fn restore(&self, payload: LoginPayload) {
        debug!("restoring session from stored login payload");
        self.store(payload);
    }

    /// One silent re-login at a time. A caller whose token was already
    /// replaced by a concurrent refresh gets the fresh token without a
    /// second round trip. Fails with [`Error::ReauthenticationRequired`]
    /// when no credentials are stored or the re-login hits a 2FA
    /// challenge — both need the operator.
    pub async fn reauthenticate(&self, stale_token: &str) -> Result<String, Error> {
        let _guard = self.reauth.lock().await;

        if let Some(current) = self.token() {
            if current != stale_token {
                debug!("token already refreshed by a concurrent call");
                return Ok(current);
            }
        }

        let creds = self
            .credentials
            .read()
            .expect("session lock poisoned")
            .clone();
        let Some(creds) = creds else {
            warn!("cannot re-authenticate: no stored credentials");
            return Err(Error::ReauthenticationRequired);
        };

        warn!("token expired, attempting silent re-login");
        // Deliberately without a 2FA code; the account may remember us.
        match self.login(&creds.email, &creds.password, None).await {
            Ok(payload) => Ok(payload.id),
            Err(Error::TwoFactorRequired) => {
                warn!("silent re-login needs a 2FA code; operator must re-authenticate");
                Err(Error::ReauthenticationRequired)
            }
            Err(e) => Err(e),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn token(&self) -> Option<String> {
        self.auth
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|a| a.token.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.auth
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|a| a.user_id.clone())
    }

    /// The full stored login payload (stream handshake credential).
    pub fn login_payload(&self) -> Option<LoginPayload> {
        self.auth
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|a| a.payload.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth
            .read()
            .expect("session lock poisoned")
            .is_some()
    }

    /// Store the triplet atomically — a reader never observes a token
    /// without the matching userId.
    fn store(&self, payload: LoginPayload) {
        let auth = Authenticated {
            token: payload.id.clone(),
            user_id: payload.user_id.clone(),
            payload,
        };
        *self.auth.write().expect("session lock poisoned") = Some(auth);
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn payload_json() -> &'static str {
        r#"{
            "id": "tok-123",
            "userId": "user-9",
            "ttl": 1209600,
            "created": "2026-03-01T10:00:00.000Z",
            "user": { "email": "a@b.c" }
        }"#
    }

    #[test]
    fn payload_preserves_unknown_fields() {
        let payload: LoginPayload = serde_json::from_str(payload_json()).unwrap();
        assert_eq!(payload.id, "tok-123");
        assert_eq!(payload.user_id, "user-9");

        // Round trip must carry every original field — the stream server
        // rejects payloads rebuilt from only the token.
        let out = serde_json::to_value(&payload).unwrap();
        assert_eq!(out["ttl"], 1209600);
        assert_eq!(out["user"]["email"], "a@b.c");
        assert_eq!(out["userId"], "user-9");
    }

    #[test]
    fn payload_requires_identity_fields() {
        let result: Result<LoginPayload, _> =
            serde_json::from_str(r#"{ "id": "tok-123", "ttl": 1 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn restore_sets_token_and_user_id_together() {
        let session = Session::new(
            reqwest::Client::new(),
            Url::parse("https://example.invalid/api/").unwrap(),
        );
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());

        let payload: LoginPayload = serde_json::from_str(payload_json()).unwrap();
        session.restore(payload.clone());

        assert_eq!(session.token().as_deref(), Some("tok-123"));
        assert_eq!(session.user_id().as_deref(), Some("user-9"));
        assert_eq!(session.login_payload(), Some(payload));
    }
}
