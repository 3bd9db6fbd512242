use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{ACCEPT, AUTHORIZATION, IF_MATCH};
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode, Url};
use serde_json::{json, Value};

use super::connection_string::ConnectionString;
use super::credential::{sign_shared_key_lite, ManagedIdentityCredential, TableAuth};
use super::{CounterRow, CounterStore, StoreError, StoreResult};
use crate::config::StorageConfig;

/// Table service REST API version; bearer auth needs 2019-02-02 or later
pub const API_VERSION: &str = "2019-02-02";

const JSON_NO_METADATA: &str = "application/json;odata=nometadata";

/// Characters left as-is inside key literals; everything else is percent-encoded
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Name of the integer property holding the count
const COUNT_PROPERTY: &str = "Count";

/// Client for a single table in the remote table service
pub struct TableClient {
    client: ReqwestClient,
    endpoint: String,
    table: String,
    auth: TableAuth,
    /// Set once the table is known to exist
    table_ready: AtomicBool,
}

impl TableClient {
    /// Build a client from settings; the endpoint wins over a connection string
    pub fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        if let Some(endpoint) = config.table_service_uri.as_deref().filter(|e| !e.is_empty()) {
            return Self::from_endpoint(endpoint, &config.table_name);
        }
        if let Some(raw) = config.connection_string.as_deref().filter(|c| !c.is_empty()) {
            return Self::from_connection_string(raw, &config.table_name);
        }
        Err(StoreError::NotConfigured)
    }

    /// Client authorized through the platform's managed identity
    pub fn from_endpoint(endpoint: &str, table: &str) -> StoreResult<Self> {
        let credential = ManagedIdentityCredential::from_env()?;
        Self::new(endpoint, table, TableAuth::Identity(credential))
    }

    /// Client authorized by the credentials embedded in a connection string
    pub fn from_connection_string(raw: &str, table: &str) -> StoreResult<Self> {
        let parsed = ConnectionString::parse(raw)?;
        let auth = match (parsed.account_name, parsed.account_key, parsed.sas_token) {
            (Some(account), Some(key), _) => TableAuth::SharedKey { account, key },
            (_, None, Some(sas)) => TableAuth::Sas(sas),
            _ => {
                return Err(StoreError::Config(
                    "connection string carries no usable credential".to_string(),
                ))
            }
        };
        Self::new(&parsed.table_endpoint, table, auth)
    }

    /// Client with an explicit endpoint and authorization
    pub fn new(endpoint: &str, table: &str, auth: TableAuth) -> StoreResult<Self> {
        Url::parse(endpoint)
            .map_err(|e| StoreError::Config(format!("invalid table endpoint '{}': {}", endpoint, e)))?;

        Ok(Self {
            client: ReqwestClient::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            table: table.to_string(),
            auth,
            table_ready: AtomicBool::new(false),
        })
    }

    /// Name of the table this client addresses
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Full request URL for a resource path below the endpoint
    pub fn resource_url(&self, path: &str) -> StoreResult<Url> {
        let mut url = format!("{}/{}", self.endpoint, path);
        if let TableAuth::Sas(sas) = &self.auth {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(sas);
        }
        Url::parse(&url).map_err(|e| StoreError::Config(format!("invalid table URL '{}': {}", url, e)))
    }

    fn row_path(&self, partition: &str, key: &str) -> String {
        format!(
            "{}(PartitionKey='{}',RowKey='{}')",
            self.table,
            escape_key(partition),
            escape_key(key)
        )
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>, replace: bool) -> StoreResult<Response> {
        let url = self.resource_url(path)?;
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let mut request = self
            .client
            .request(method, url.clone())
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("DataServiceVersion", "3.0;NetFx")
            .header("MaxDataServiceVersion", "3.0;NetFx")
            .header(ACCEPT, JSON_NO_METADATA);

        request = match &self.auth {
            TableAuth::SharedKey { account, key } => {
                let string_to_sign = format!("{}\n/{}{}", date, account, url.path());
                let signature = sign_shared_key_lite(key, &string_to_sign)?;
                request.header(AUTHORIZATION, format!("SharedKeyLite {}:{}", account, signature))
            }
            TableAuth::Identity(credential) => request.bearer_auth(credential.token().await?),
            TableAuth::Sas(_) => request,
        };

        if replace {
            request = request.header(IF_MATCH, "*");
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        Ok(request.send().await?)
    }
}

/// Escape a key for use inside a quoted OData key literal in a URL path
///
/// Quotes are doubled for OData, then the result is percent-encoded so
/// that `%`, `#`, `?` and `/` cannot change the request URL.
pub fn escape_key(key: &str) -> String {
    utf8_percent_encode(&key.replace('\'', "''"), KEY_ENCODE_SET).to_string()
}

/// Turn a non-success response into a [`StoreError::Status`]
async fn status_error(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let error = &parsed["odata.error"];

    StoreError::Status {
        status,
        code: error["code"].as_str().unwrap_or("Unknown").to_string(),
        message: error["message"]["value"]
            .as_str()
            .map(str::to_string)
            .unwrap_or(body),
    }
}

#[async_trait]
impl CounterStore for TableClient {
    async fn ensure_table_exists(&self) -> StoreResult<()> {
        if self.table_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let response = self
            .send(Method::POST, "Tables", Some(json!({ "TableName": self.table })), false)
            .await?;

        match response.status() {
            status if status.is_success() || status == StatusCode::CONFLICT => {
                self.table_ready.store(true, Ordering::Release);
                Ok(())
            }
            _ => Err(status_error(response).await),
        }
    }

    async fn get_row(&self, partition: &str, key: &str) -> StoreResult<Option<CounterRow>> {
        let response = self
            .send(Method::GET, &self.row_path(partition, key), None, false)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let entity: Value = response.json().await?;
        let count = entity[COUNT_PROPERTY]
            .as_i64()
            .ok_or_else(|| StoreError::MalformedRow(format!("{}/{} has no integer {}", partition, key, COUNT_PROPERTY)))?;

        Ok(Some(CounterRow {
            partition: partition.to_string(),
            key: key.to_string(),
            count,
        }))
    }

    async fn create_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()> {
        let entity = json!({
            "PartitionKey": partition,
            "RowKey": key,
            (COUNT_PROPERTY): count,
        });
        let response = self
            .send(Method::POST, &self.table, Some(entity), false)
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn update_row(&self, partition: &str, key: &str, count: i64) -> StoreResult<()> {
        let entity = json!({
            "PartitionKey": partition,
            "RowKey": key,
            (COUNT_PROPERTY): count,
        });
        let response = self
            .send(Method::PUT, &self.row_path(partition, key), Some(entity), true)
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}
