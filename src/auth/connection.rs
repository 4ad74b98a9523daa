//! Storage account handles built from connection strings
//!
//! This module turns an Azure Storage connection string into a
//! [`StorageAccount`]: the account name, its credential and the blob
//! endpoint every client derives its URLs from.

use crate::auth::sas::SasToken;
use crate::error::{BlobTourError, Result};
use crate::utils::helpers::parse_connection_string;
use base64::Engine;
use regex::Regex;
use std::fmt;
use tracing::{debug, error};
use url::Url;
use zeroize::Zeroizing;

/// Well-known account name of the local storage emulator
pub const DEV_STORE_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known account key of the local storage emulator
pub const DEV_STORE_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Blob service port of the local storage emulator
pub const DEV_STORE_BLOB_PORT: u16 = 10000;

/// Endpoint suffix of the public Azure cloud
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Diagnostic printed when the connection string cannot be used
pub const INVALID_CONNECTION_STRING_HINT: &str =
    "提供的存储信息无效，请确认配置文件中的AccountName和AccountKey有效后重新启动该示例";

/// Credential attached to a storage account handle
#[derive(Clone)]
pub enum StorageCredential {
    /// Base64 account key; grants full access and can sign SAS tokens
    AccountKey(Zeroizing<String>),
    /// Delegated, time-limited access, kept as the query string the service
    /// will check (account or service SAS)
    SharedAccessSignature(Zeroizing<String>),
}

impl fmt::Debug for StorageCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountKey(_) => f.write_str("AccountKey(<redacted>)"),
            Self::SharedAccessSignature(query) => f
                .debug_struct("SharedAccessSignature")
                .field("expiry", &sas_parameter(query, "se"))
                .finish_non_exhaustive(),
        }
    }
}

/// Storage account handle: credentials plus blob endpoint
#[derive(Debug, Clone)]
pub struct StorageAccount {
    name: String,
    credential: StorageCredential,
    blob_endpoint: Url,
    emulator: bool,
}

impl StorageAccount {
    /// Parse a connection string into an account handle
    pub fn parse(connection_string: &str) -> Result<Self> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(BlobTourError::connection_string("connection string is empty"));
        }

        let settings = parse_connection_string(trimmed)?;
        let mut parsed = ParsedSettings::default();

        for (key, value) in settings {
            let slot = match key.to_ascii_lowercase().as_str() {
                "usedevelopmentstorage" => &mut parsed.use_development_storage,
                "developmentstorageproxyuri" => &mut parsed.proxy_uri,
                "defaultendpointsprotocol" => &mut parsed.protocol,
                "accountname" => &mut parsed.account_name,
                "accountkey" => &mut parsed.account_key,
                "sharedaccesssignature" => &mut parsed.sas,
                "endpointsuffix" => &mut parsed.endpoint_suffix,
                "blobendpoint" => &mut parsed.blob_endpoint,
                "queueendpoint" | "tableendpoint" | "fileendpoint" => &mut parsed.ignored,
                _ => {
                    return Err(BlobTourError::connection_string(format!(
                        "unrecognized setting '{key}'"
                    )))
                }
            };
            *slot = Some(value);
        }

        if let Some(flag) = parsed.use_development_storage.as_deref() {
            return Self::from_development_settings(flag, &parsed);
        }

        Self::from_account_settings(parsed)
    }

    /// Handle for the local storage emulator with its well-known credentials
    pub fn development() -> Self {
        let blob_endpoint = Url::parse(&format!(
            "http://127.0.0.1:{DEV_STORE_BLOB_PORT}/{DEV_STORE_ACCOUNT_NAME}"
        ))
        .expect("emulator endpoint is a valid URL");

        Self {
            name: DEV_STORE_ACCOUNT_NAME.to_string(),
            credential: StorageCredential::AccountKey(Zeroizing::new(
                DEV_STORE_ACCOUNT_KEY.to_string(),
            )),
            blob_endpoint,
            emulator: true,
        }
    }

    /// Derive a handle for the same account that authenticates with a SAS token
    pub fn with_sas(&self, token: SasToken) -> Self {
        Self {
            name: self.name.clone(),
            credential: StorageCredential::SharedAccessSignature(Zeroizing::new(
                token.to_string(),
            )),
            blob_endpoint: self.blob_endpoint.clone(),
            emulator: self.emulator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credential(&self) -> &StorageCredential {
        &self.credential
    }

    pub fn blob_endpoint(&self) -> &Url {
        &self.blob_endpoint
    }

    pub fn is_emulator(&self) -> bool {
        self.emulator
    }

    /// Account key, when the handle was built from one
    pub fn account_key(&self) -> Option<&str> {
        match &self.credential {
            StorageCredential::AccountKey(key) => Some(key.as_str()),
            StorageCredential::SharedAccessSignature(_) => None,
        }
    }

    /// SAS query string, when the handle authenticates with one
    pub fn sas(&self) -> Option<&str> {
        match &self.credential {
            StorageCredential::AccountKey(_) => None,
            StorageCredential::SharedAccessSignature(query) => Some(query.as_str()),
        }
    }

    /// URI of a container under this account's blob endpoint
    pub fn container_uri(&self, container: &str) -> Result<Url> {
        let base = self.blob_endpoint.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{container}"))?)
    }

    /// URI of a blob inside a container
    pub fn blob_uri(&self, container: &str, blob: &str) -> Result<Url> {
        let mut uri = self.container_uri(container)?;
        uri.path_segments_mut()
            .map_err(|_| BlobTourError::invalid_argument("blob endpoint cannot hold a path"))?
            .push(blob);
        Ok(uri)
    }

    fn from_development_settings(flag: &str, parsed: &ParsedSettings) -> Result<Self> {
        if !flag.eq_ignore_ascii_case("true") {
            return Err(BlobTourError::connection_string(format!(
                "UseDevelopmentStorage must be 'true', got '{flag}'"
            )));
        }

        if parsed.account_name.is_some()
            || parsed.account_key.is_some()
            || parsed.sas.is_some()
            || parsed.blob_endpoint.is_some()
            || parsed.endpoint_suffix.is_some()
        {
            return Err(BlobTourError::connection_string(
                "UseDevelopmentStorage cannot be combined with account settings",
            ));
        }

        let mut account = Self::development();
        if let Some(proxy) = parsed.proxy_uri.as_deref() {
            let proxy = Url::parse(proxy).map_err(|e| {
                BlobTourError::connection_string(format!("invalid DevelopmentStorageProxyUri: {e}"))
            })?;
            let host = proxy.host_str().ok_or_else(|| {
                BlobTourError::connection_string("DevelopmentStorageProxyUri has no host")
            })?;
            account.blob_endpoint = Url::parse(&format!(
                "{}://{host}:{DEV_STORE_BLOB_PORT}/{DEV_STORE_ACCOUNT_NAME}",
                proxy.scheme()
            ))?;
        }

        Ok(account)
    }

    fn from_account_settings(parsed: ParsedSettings) -> Result<Self> {
        let protocol = match parsed.protocol.as_deref() {
            None => "https",
            Some(p) if p.eq_ignore_ascii_case("https") => "https",
            Some(p) if p.eq_ignore_ascii_case("http") => "http",
            Some(p) => {
                return Err(BlobTourError::connection_string(format!(
                    "DefaultEndpointsProtocol must be 'http' or 'https', got '{p}'"
                )))
            }
        };

        let credential = match (parsed.account_key, parsed.sas) {
            (Some(_), Some(_)) => {
                return Err(BlobTourError::connection_string(
                    "AccountKey and SharedAccessSignature are mutually exclusive",
                ))
            }
            (Some(key), None) => {
                base64::engine::general_purpose::STANDARD
                    .decode(key.as_bytes())
                    .map_err(|_| BlobTourError::connection_string("AccountKey is not valid base64"))?;
                StorageCredential::AccountKey(Zeroizing::new(key))
            }
            (None, Some(sas)) => StorageCredential::SharedAccessSignature(parse_sas_setting(&sas)?),
            (None, None) => {
                return Err(BlobTourError::connection_string(
                    "either AccountKey or SharedAccessSignature is required",
                ))
            }
        };

        let explicit_endpoint = parsed
            .blob_endpoint
            .as_deref()
            .map(|endpoint| {
                Url::parse(endpoint).map_err(|e| {
                    BlobTourError::connection_string(format!("invalid BlobEndpoint: {e}"))
                })
            })
            .transpose()?;

        let name = match (parsed.account_name, &explicit_endpoint) {
            (Some(name), _) => name,
            (None, Some(endpoint)) => endpoint
                .host_str()
                .and_then(|host| host.split('.').next())
                .map(str::to_string)
                .ok_or_else(|| BlobTourError::connection_string("BlobEndpoint has no host"))?,
            (None, None) => {
                return Err(BlobTourError::connection_string(
                    "AccountName is required when BlobEndpoint is not given",
                ))
            }
        };

        if matches!(credential, StorageCredential::AccountKey(_)) {
            validate_account_name(&name)?;
        }

        let blob_endpoint = match explicit_endpoint {
            Some(endpoint) => endpoint,
            None => {
                let suffix = parsed
                    .endpoint_suffix
                    .as_deref()
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
                    .trim_matches('.');
                Url::parse(&format!("{protocol}://{name}.blob.{suffix}")).map_err(|e| {
                    BlobTourError::connection_string(format!("invalid EndpointSuffix: {e}"))
                })?
            }
        };

        debug!("Resolved blob endpoint {} for account {}", blob_endpoint, name);

        Ok(Self {
            name,
            credential,
            blob_endpoint,
            emulator: false,
        })
    }
}

#[derive(Default)]
struct ParsedSettings {
    use_development_storage: Option<String>,
    proxy_uri: Option<String>,
    protocol: Option<String>,
    account_name: Option<String>,
    account_key: Option<String>,
    sas: Option<String>,
    endpoint_suffix: Option<String>,
    blob_endpoint: Option<String>,
    ignored: Option<String>,
}

/// Account names are 3-24 lowercase letters and digits
fn validate_account_name(name: &str) -> Result<()> {
    let re = Regex::new(r"^[a-z0-9]{3,24}$")?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(BlobTourError::connection_string(format!(
            "invalid AccountName '{name}': expected 3-24 lowercase letters or digits"
        )))
    }
}

/// Accept any SAS the service could honor: only the version and signature are required
fn parse_sas_setting(sas: &str) -> Result<Zeroizing<String>> {
    let query = sas.trim().trim_start_matches('?');
    for param in ["sv", "sig"] {
        if sas_parameter(query, param).map_or(true, |value| value.is_empty()) {
            return Err(BlobTourError::connection_string(format!(
                "SharedAccessSignature is missing its '{param}' parameter"
            )));
        }
    }
    Ok(Zeroizing::new(query.to_string()))
}

fn sas_parameter(query: &str, param: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == param)
        .map(|(_, value)| value.into_owned())
}

/// Parse the configured connection string, printing a diagnostic when it is unusable
pub fn create_storage_account_from_connection_string(
    connection_string: &str,
) -> Result<StorageAccount> {
    StorageAccount::parse(connection_string).map_err(|e| {
        error!("Rejected storage connection string: {}", e);
        println!("{INVALID_CONNECTION_STRING_HINT}");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_endpoint() {
        let account = StorageAccount::development();
        assert_eq!(account.name(), "devstoreaccount1");
        assert!(account.is_emulator());
        assert_eq!(
            account.blob_endpoint().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1"
        );
    }

    #[test]
    fn test_container_uri() {
        let account = StorageAccount::development();
        let uri = account.container_uri("demo").unwrap();
        assert_eq!(uri.as_str(), "http://127.0.0.1:10000/devstoreaccount1/demo");
    }

    #[test]
    fn test_blob_uri_escapes_name() {
        let account = StorageAccount::development();
        let uri = account.blob_uri("demo", "Hello World.png").unwrap();
        assert_eq!(
            uri.as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/demo/Hello%20World.png"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let account = StorageAccount::development();
        let rendered = format!("{account:?}");
        assert!(!rendered.contains(DEV_STORE_ACCOUNT_KEY));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_sas_setting_keeps_query_verbatim() {
        let query = parse_sas_setting("?sv=2022-11-02&sr=c&sp=rl&se=2030-01-01&sig=c2ln").unwrap();
        assert_eq!(query.as_str(), "sv=2022-11-02&sr=c&sp=rl&se=2030-01-01&sig=c2ln");
        assert!(parse_sas_setting("sv=2022-11-02&sp=rl").is_err());
        assert!(parse_sas_setting("sv=&sig=c2ln").is_err());
    }

    #[test]
    fn test_debug_hides_sas_signature() {
        let account = StorageAccount::development().with_sas(
            SasToken::parse("sv=2019-02-02&ss=b&srt=co&sp=rl&se=2030-01-01T00%3A00%3A00Z&sig=c2VjcmV0")
                .unwrap(),
        );
        let rendered = format!("{account:?}");
        assert!(rendered.contains("2030-01-01T00:00:00Z"));
        assert!(!rendered.contains("c2VjcmV0"));
    }
}
