// Authorized HTTP client for the My Leviton REST API.
//
// Wraps `reqwest::Client` with token attachment and the retry-once
// re-authentication policy, plus the account → residence → device
// directory resolution and device attribute control.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::models::{AttributePatch, Device, Residence, ResidentialAccount, ResidentialPermission};
use crate::session::Session;
use crate::transport::{BASE_URL, TransportConfig};

/// Authorized client: every call carries the session token; a 401
/// triggers exactly one silent re-login and one retry, never a loop.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<Session>,
}

impl ApiClient {
    /// Create a client against the production endpoint.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let base_url = Url::parse(BASE_URL)?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client with a pre-built `reqwest::Client` and base URL.
    ///
    /// Use this for tests against a mock server.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        let session = Arc::new(Session::new(http.clone(), base_url.clone()));
        Self {
            http,
            base_url,
            session,
        }
    }

    /// The session owning the token and login payload.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send an authorized request. On a 401 the session attempts one
    /// silent re-login; the original call is then retried exactly once
    /// with the refreshed token. If silent recovery is impossible the
    /// caller sees [`Error::ReauthenticationRequired`].
    async fn request<F>(
        &self,
        method: reqwest::Method,
        url: Url,
        customize: F,
    ) -> Result<reqwest::Response, Error>
    where
        F: Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let token = self.session.token().ok_or(Error::NotAuthenticated)?;

        let resp = customize(self.http.request(method.clone(), url.clone()))
            .header(AUTHORIZATION, &token)
            .send()
            .await
            .map_err(Error::Transport)?;

        if resp.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let fresh = self.session.reauthenticate(&token).await?;
        debug!("retrying request with refreshed token");

        customize(self.http.request(method, url))
            .header(AUTHORIZATION, &fresh)
            .send()
            .await
            .map_err(Error::Transport)
    }

    /// GET a JSON document through the authorized path.
    async fn get_json<T, F>(&self, url: Url, customize: F) -> Result<T, Error>
    where
        T: DeserializeOwned,
        F: Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let resp = self.request(reqwest::Method::GET, url, customize).await?;
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    // ── Directory resolution ─────────────────────────────────────────

    /// Step 1: resolve the residential account from the user's
    /// permission list (first entry).
    pub async fn residential_account_id(&self) -> Result<String, Error> {
        let user_id = self.session.user_id().ok_or(Error::NotAuthenticated)?;
        let url = self
            .base_url
            .join(&format!("Person/{user_id}/residentialPermissions"))?;

        debug!("fetching residential permissions");
        let permissions: Vec<ResidentialPermission> = self.get_json(url, |rb| rb).await?;

        permissions
            .first()
            .and_then(|p| p.residential_account_id.clone())
            .ok_or(Error::NoPermissions)
    }

    /// Step 2: resolve the residence from the account record, falling
    /// back to the first entry of the account's residence list when no
    /// primary residence is set.
    pub async fn primary_residence_id(&self, account_id: &str) -> Result<String, Error> {
        let url = self
            .base_url
            .join(&format!("ResidentialAccounts/{account_id}"))?;

        debug!(account_id, "fetching residential account");
        let account: ResidentialAccount = self.get_json(url, |rb| rb).await?;

        if let Some(id) = account.primary_residence_id {
            return Ok(id);
        }

        warn!("primaryResidenceId missing, listing residences");
        let url = self
            .base_url
            .join(&format!("ResidentialAccounts/{account_id}/residences"))?;
        let residences: Vec<Residence> = self.get_json(url, |rb| rb).await?;

        residences
            .into_iter()
            .find_map(|r| r.id)
            .ok_or(Error::NoResidences)
    }

    /// Step 3: fetch the device list for a residence. An empty list is
    /// a valid result, not an error.
    pub async fn devices(&self, residence_id: &str) -> Result<Vec<Device>, Error> {
        let url = self
            .base_url
            .join(&format!("Residences/{residence_id}/iotSwitches"))?;

        // iotButtons ride along for scene controllers.
        let filter = serde_json::json!({ "include": ["iotButtons"] }).to_string();

        debug!(residence_id, "discovering devices");
        let devices: Vec<Device> = self
            .get_json(url, |rb| rb.header("filter", &filter))
            .await?;

        info!(count = devices.len(), "discovered devices");
        Ok(devices)
    }

    // ── Device state & control ───────────────────────────────────────

    /// Fetch the current state of a single device.
    pub async fn device(&self, device_id: &str) -> Result<Device, Error> {
        let url = self.base_url.join(&format!("IotSwitches/{device_id}"))?;
        self.get_json(url, |rb| rb).await
    }

    /// Apply a partial attribute update (power, brightness, fan speed).
    /// Success is a plain acknowledgement; the body is ignored.
    pub async fn set_attributes(
        &self,
        device_id: &str,
        patch: &AttributePatch,
    ) -> Result<(), Error> {
        let url = self.base_url.join(&format!("IotSwitches/{device_id}"))?;

        debug!(device_id, ?patch, "updating device attributes");
        let resp = self
            .request(reqwest::Method::PUT, url, |rb| rb.json(patch))
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!(device_id, "device updated");
        Ok(())
    }
}
