use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::{StoreError, StoreResult};

/// Account name of the local storage emulator
pub const DEV_STORAGE_ACCOUNT: &str = "devstoreaccount1";

/// Published key of the local storage emulator
const DEV_STORAGE_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const DEV_STORAGE_TABLE_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

/// Parsed storage account connection string
///
/// Only the parts the table client needs are kept: where to send requests
/// and how to authorize them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Table service endpoint without a trailing slash
    pub table_endpoint: String,
    /// Account name, when one was given or implied
    pub account_name: Option<String>,
    /// Decoded account key
    pub account_key: Option<Vec<u8>>,
    /// Shared access signature without a leading `?`
    pub sas_token: Option<String>,
}

impl ConnectionString {
    /// Parse a `Key=Value;Key=Value` connection string
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut account_name = None;
        let mut account_key = None;
        let mut table_endpoint = None;
        let mut sas_token = None;
        let mut development = false;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Values such as base64 keys and SAS tokens may contain '='.
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| StoreError::Config(format!("malformed connection string segment '{}'", part)))?;
            let value = value.trim();

            match name.trim() {
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "EndpointSuffix" => suffix = value.to_string(),
                "TableEndpoint" => table_endpoint = Some(value.trim_end_matches('/').to_string()),
                "SharedAccessSignature" => sas_token = Some(value.trim_start_matches('?').to_string()),
                "UseDevelopmentStorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            return Ok(Self {
                table_endpoint: table_endpoint.unwrap_or_else(|| DEV_STORAGE_TABLE_ENDPOINT.to_string()),
                account_name: Some(DEV_STORAGE_ACCOUNT.to_string()),
                account_key: Some(decode_key(DEV_STORAGE_KEY)?),
                sas_token: None,
            });
        }

        let table_endpoint = match (table_endpoint, &account_name) {
            (Some(endpoint), _) => endpoint,
            (None, Some(account)) => format!("{}://{}.table.{}", protocol, account, suffix),
            (None, None) => {
                return Err(StoreError::Config(
                    "connection string has neither TableEndpoint nor AccountName".to_string(),
                ))
            }
        };

        let account_key = account_key.as_deref().map(decode_key).transpose()?;
        if account_key.is_some() && account_name.is_none() {
            return Err(StoreError::Config("AccountKey requires AccountName".to_string()));
        }
        if account_key.is_none() && sas_token.is_none() {
            return Err(StoreError::Config(
                "connection string carries no AccountKey or SharedAccessSignature".to_string(),
            ));
        }

        Ok(Self {
            table_endpoint,
            account_name,
            account_key,
            sas_token,
        })
    }
}

fn decode_key(key: &str) -> StoreResult<Vec<u8>> {
    STANDARD
        .decode(key)
        .map_err(|e| StoreError::Config(format!("AccountKey is not valid base64: {}", e)))
}
