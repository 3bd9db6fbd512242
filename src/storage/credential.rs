use std::env;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tokio::sync::RwLock;

use super::{StoreError, StoreResult};

/// Audience of storage access tokens
const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Tokens this close to expiry are refreshed
const REFRESH_MARGIN_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// How table requests are authorized
pub enum TableAuth {
    /// `SharedKeyLite` signature with the account key
    SharedKey { account: String, key: Vec<u8> },
    /// Shared access signature appended to every request URL
    Sas(String),
    /// Bearer token from the hosting platform's managed identity
    Identity(ManagedIdentityCredential),
}

impl std::fmt::Debug for TableAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableAuth::SharedKey { account, .. } => write!(f, "SharedKey({})", account),
            TableAuth::Sas(_) => write!(f, "Sas"),
            TableAuth::Identity(_) => write!(f, "Identity"),
        }
    }
}

/// Compute a `SharedKeyLite` signature over `string_to_sign`
///
/// For the table service the string to sign is the `x-ms-date` value and
/// the canonicalized resource (`/{account}{path}`) joined by a newline.
pub fn sign_shared_key_lite(key: &[u8], string_to_sign: &str) -> StoreResult<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StoreError::Auth(format!("unusable account key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_on: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_on: serde_json::Value,
}

#[derive(Debug, Clone)]
enum IdentitySource {
    /// App Service / Functions identity endpoint
    AppService { endpoint: String, secret: String },
    /// Instance metadata service
    Imds,
}

/// Managed identity token source for storage requests
///
/// Uses the platform identity endpoint when `IDENTITY_ENDPOINT` and
/// `IDENTITY_HEADER` are set, the instance metadata service otherwise.
/// `AZURE_CLIENT_ID` selects a user-assigned identity.
pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    source: IdentitySource,
    client_id: Option<String>,
    cached: RwLock<Option<AccessToken>>,
}

impl ManagedIdentityCredential {
    /// Create a credential from the process environment
    pub fn from_env() -> StoreResult<Self> {
        let source = match (env::var("IDENTITY_ENDPOINT"), env::var("IDENTITY_HEADER")) {
            (Ok(endpoint), Ok(secret)) => IdentitySource::AppService { endpoint, secret },
            _ => IdentitySource::Imds,
        };

        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            source,
            client_id: env::var("AZURE_CLIENT_ID").ok().filter(|id| !id.is_empty()),
            cached: RwLock::new(None),
        })
    }

    /// Return a valid bearer token, fetching a new one when needed
    pub async fn token(&self) -> StoreResult<String> {
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = self.cached.read().await.as_ref() {
            if token.expires_on - REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_on - REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch(&self) -> StoreResult<AccessToken> {
        let mut query = vec![("resource", STORAGE_RESOURCE.to_string())];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.clone()));
        }

        let request = match &self.source {
            IdentitySource::AppService { endpoint, secret } => {
                query.push(("api-version", "2019-08-01".to_string()));
                self.http.get(endpoint).header("X-IDENTITY-HEADER", secret)
            }
            IdentitySource::Imds => {
                query.push(("api-version", "2018-02-01".to_string()));
                self.http.get(IMDS_ENDPOINT).header("Metadata", "true")
            }
        };

        let response = request.query(&query).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("identity endpoint returned {}: {}", status, body)));
        }

        let body: TokenResponse = response.json().await?;
        let expires_on = match &body.expires_on {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| StoreError::Auth("identity endpoint returned no usable expires_on".to_string()))?;

        tracing::debug!(expires_on, "Acquired storage access token");

        Ok(AccessToken {
            value: body.access_token,
            expires_on,
        })
    }
}
