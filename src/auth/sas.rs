//! Account shared access signatures
//!
//! Builds account SAS tokens from an access policy, renders them as URL
//! query strings, parses them back and checks whether a token grants a
//! given blob operation at a given instant.

use crate::auth::connection::StorageAccount;
use crate::error::{BlobTourError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Timelike, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::marker::PhantomData;
use std::net::IpAddr;

type HmacSha256 = Hmac<Sha256>;

/// Service version stamped into generated tokens
pub const ACCOUNT_SAS_VERSION: &str = "2019-02-02";

/// First service version whose string-to-sign carries an encryption scope line
const ENCRYPTION_SCOPE_VERSION: &str = "2020-12-06";

const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A single-letter flag of an account SAS field
pub trait SasFlag: Copy + Eq + fmt::Debug + 'static {
    /// Every flag in the order the service expects them to be written
    const ALL: &'static [Self];
    /// Query parameter the flags are written to
    const PARAM: &'static str;

    fn code(self) -> char;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasPermission {
    Read,
    Write,
    Delete,
    List,
    Add,
    Create,
    Update,
    Process,
}

impl SasFlag for SasPermission {
    const ALL: &'static [Self] = &[
        Self::Read,
        Self::Write,
        Self::Delete,
        Self::List,
        Self::Add,
        Self::Create,
        Self::Update,
        Self::Process,
    ];
    const PARAM: &'static str = "sp";

    fn code(self) -> char {
        match self {
            Self::Read => 'r',
            Self::Write => 'w',
            Self::Delete => 'd',
            Self::List => 'l',
            Self::Add => 'a',
            Self::Create => 'c',
            Self::Update => 'u',
            Self::Process => 'p',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasService {
    Blob,
    File,
    Queue,
    Table,
}

impl SasFlag for SasService {
    const ALL: &'static [Self] = &[Self::Blob, Self::File, Self::Queue, Self::Table];
    const PARAM: &'static str = "ss";

    fn code(self) -> char {
        match self {
            Self::Blob => 'b',
            Self::File => 'f',
            Self::Queue => 'q',
            Self::Table => 't',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasResourceType {
    Service,
    Container,
    Object,
}

impl SasFlag for SasResourceType {
    const ALL: &'static [Self] = &[Self::Service, Self::Container, Self::Object];
    const PARAM: &'static str = "srt";

    fn code(self) -> char {
        match self {
            Self::Service => 's',
            Self::Container => 'c',
            Self::Object => 'o',
        }
    }
}

/// Set of SAS flags, rendered in canonical order
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SasFlags<F> {
    bits: u8,
    _flag: PhantomData<F>,
}

pub type AccountSasPermissions = SasFlags<SasPermission>;
pub type AccountSasServices = SasFlags<SasService>;
pub type AccountSasResourceTypes = SasFlags<SasResourceType>;

impl<F: SasFlag> SasFlags<F> {
    pub fn empty() -> Self {
        Self {
            bits: 0,
            _flag: PhantomData,
        }
    }

    pub fn with(mut self, flag: F) -> Self {
        self.bits |= Self::bit(flag);
        self
    }

    pub fn contains(&self, flag: F) -> bool {
        self.bits & Self::bit(flag) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Parse the letters of a SAS field; unknown or repeated letters are rejected
    pub fn parse(value: &str) -> Result<Self> {
        let mut flags = Self::empty();
        for c in value.chars() {
            let flag = F::ALL
                .iter()
                .copied()
                .find(|f| f.code() == c)
                .ok_or_else(|| {
                    BlobTourError::sas(format!("unknown flag '{c}' in '{}'", F::PARAM))
                })?;
            if flags.contains(flag) {
                return Err(BlobTourError::sas(format!(
                    "flag '{c}' repeated in '{}'",
                    F::PARAM
                )));
            }
            flags = flags.with(flag);
        }
        if flags.is_empty() {
            return Err(BlobTourError::sas(format!("'{}' is empty", F::PARAM)));
        }
        Ok(flags)
    }

    fn bit(flag: F) -> u8 {
        F::ALL
            .iter()
            .position(|f| *f == flag)
            .map_or(0, |index| 1 << index)
    }
}

impl<F: SasFlag> FromIterator<F> for SasFlags<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl<F: SasFlag> fmt::Display for SasFlags<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in F::ALL.iter().filter(|flag| self.contains(**flag)) {
            write!(f, "{}", flag.code())?;
        }
        Ok(())
    }
}

impl<F: SasFlag> fmt::Debug for SasFlags<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", F::PARAM, self)
    }
}

/// Protocols a token may be used over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasProtocol {
    HttpsOnly,
    HttpsOrHttp,
}

impl SasProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpsOnly => "https",
            Self::HttpsOrHttp => "https,http",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "https" => Ok(Self::HttpsOnly),
            "https,http" => Ok(Self::HttpsOrHttp),
            other => Err(BlobTourError::sas(format!("unknown protocol '{other}'"))),
        }
    }
}

/// Access policy an account SAS is issued for
#[derive(Debug, Clone)]
pub struct AccountSasPolicy {
    pub permissions: AccountSasPermissions,
    pub services: AccountSasServices,
    pub resource_types: AccountSasResourceTypes,
    pub start: Option<DateTime<Utc>>,
    pub expiry: DateTime<Utc>,
    pub protocol: Option<SasProtocol>,
    pub ip: Option<String>,
}

impl AccountSasPolicy {
    /// Read, write, list, create and delete on blob containers and blobs,
    /// over HTTPS or HTTP, valid from now for `lifetime`
    pub fn blob_container_and_objects(now: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            permissions: [
                SasPermission::Read,
                SasPermission::Write,
                SasPermission::List,
                SasPermission::Create,
                SasPermission::Delete,
            ]
            .into_iter()
            .collect(),
            services: AccountSasServices::empty().with(SasService::Blob),
            resource_types: AccountSasResourceTypes::empty()
                .with(SasResourceType::Container)
                .with(SasResourceType::Object),
            start: None,
            expiry: now + lifetime,
            protocol: Some(SasProtocol::HttpsOrHttp),
            ip: None,
        }
    }
}

/// Blob operations a SAS token can be checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasOperation {
    CreateContainer,
    DeleteContainer,
    ListBlobs,
    WriteBlob,
    ReadBlob,
    DeleteBlob,
}

impl SasOperation {
    fn resource_type(self) -> SasResourceType {
        match self {
            Self::CreateContainer | Self::DeleteContainer | Self::ListBlobs => {
                SasResourceType::Container
            }
            Self::WriteBlob | Self::ReadBlob | Self::DeleteBlob => SasResourceType::Object,
        }
    }

    /// Any one of these permissions grants the operation
    fn accepted_permissions(self) -> &'static [SasPermission] {
        match self {
            Self::CreateContainer | Self::WriteBlob => {
                &[SasPermission::Create, SasPermission::Write]
            }
            Self::DeleteContainer | Self::DeleteBlob => &[SasPermission::Delete],
            Self::ListBlobs => &[SasPermission::List],
            Self::ReadBlob => &[SasPermission::Read],
        }
    }
}

/// Signed account SAS token
#[derive(Clone, PartialEq, Eq)]
pub struct SasToken {
    version: String,
    services: AccountSasServices,
    resource_types: AccountSasResourceTypes,
    permissions: AccountSasPermissions,
    start: Option<DateTime<Utc>>,
    expiry: DateTime<Utc>,
    ip: Option<String>,
    protocol: Option<SasProtocol>,
    signature: String,
}

impl SasToken {
    /// Parse a token from its query-string form, with or without a leading '?'
    pub fn parse(token: &str) -> Result<Self> {
        let query = token.trim().trim_start_matches('?');

        let mut version = None;
        let mut services = None;
        let mut resource_types = None;
        let mut permissions = None;
        let mut start = None;
        let mut expiry = None;
        let mut ip = None;
        let mut protocol = None;
        let mut signature = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "sv" => version = Some(value.into_owned()),
                "ss" => services = Some(AccountSasServices::parse(&value)?),
                "srt" => resource_types = Some(AccountSasResourceTypes::parse(&value)?),
                "sp" => permissions = Some(AccountSasPermissions::parse(&value)?),
                "st" => start = Some(parse_sas_time("st", &value)?),
                "se" => expiry = Some(parse_sas_time("se", &value)?),
                "sip" => ip = Some(value.into_owned()),
                "spr" => protocol = Some(SasProtocol::parse(&value)?),
                "sig" => signature = Some(value.into_owned()),
                other => {
                    return Err(BlobTourError::sas(format!(
                        "unexpected parameter '{other}' in account SAS"
                    )))
                }
            }
        }

        let missing = |param: &str| BlobTourError::sas(format!("missing '{param}' parameter"));

        Ok(Self {
            version: version.ok_or_else(|| missing("sv"))?,
            services: services.ok_or_else(|| missing("ss"))?,
            resource_types: resource_types.ok_or_else(|| missing("srt"))?,
            permissions: permissions.ok_or_else(|| missing("sp"))?,
            start,
            expiry: expiry.ok_or_else(|| missing("se"))?,
            ip,
            protocol,
            signature: signature.ok_or_else(|| missing("sig"))?,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn services(&self) -> AccountSasServices {
        self.services
    }

    pub fn resource_types(&self) -> AccountSasResourceTypes {
        self.resource_types
    }

    pub fn permissions(&self) -> AccountSasPermissions {
        self.permissions
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn protocol(&self) -> Option<SasProtocol> {
        self.protocol
    }

    /// Base64 HMAC-SHA256 signature
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// A token is usable strictly before its expiry
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Whether a request over `scheme` may carry this token
    pub fn allows_protocol(&self, scheme: &str) -> bool {
        match self.protocol {
            Some(SasProtocol::HttpsOnly) => scheme.eq_ignore_ascii_case("https"),
            Some(SasProtocol::HttpsOrHttp) | None => {
                scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("http")
            }
        }
    }

    /// Whether `client` falls inside the signed IP address or `low-high` range
    pub fn allows_ip(&self, client: IpAddr) -> bool {
        let Some(range) = self.ip.as_deref() else {
            return true;
        };
        let (low, high) = range.split_once('-').unwrap_or((range, range));
        match (low.trim().parse::<IpAddr>(), high.trim().parse::<IpAddr>()) {
            (Ok(low), Ok(high)) => low <= client && client <= high,
            _ => false,
        }
    }

    /// Reject a request whose scheme or client address the token does not allow
    pub fn check_origin(&self, scheme: &str, client: IpAddr) -> Result<()> {
        if !self.allows_protocol(scheme) {
            return Err(BlobTourError::authorization(format!(
                "SAS token does not allow {scheme} requests"
            )));
        }
        if !self.allows_ip(client) {
            return Err(BlobTourError::authorization(format!(
                "SAS token does not allow requests from {client}"
            )));
        }
        Ok(())
    }

    /// Check that this token was signed by `account_key` and grants `operation` at `now`
    pub fn authorize(
        &self,
        account_name: &str,
        account_key: &str,
        now: DateTime<Utc>,
        operation: SasOperation,
    ) -> Result<()> {
        let provided = STANDARD
            .decode(self.signature.as_bytes())
            .map_err(|_| BlobTourError::authorization("SAS signature is not valid base64"))?;
        new_mac(account_key, &self.string_to_sign(account_name))?
            .verify_slice(&provided)
            .map_err(|_| BlobTourError::authorization("SAS signature does not match"))?;

        if self.is_expired_at(now) {
            return Err(BlobTourError::authorization(format!(
                "SAS token expired at {}",
                format_sas_time(self.expiry)
            )));
        }
        if let Some(start) = self.start {
            if now < start {
                return Err(BlobTourError::authorization(format!(
                    "SAS token is not valid before {}",
                    format_sas_time(start)
                )));
            }
        }
        if !self.services.contains(SasService::Blob) {
            return Err(BlobTourError::authorization(
                "SAS token does not cover the blob service",
            ));
        }

        let resource_type = operation.resource_type();
        if !self.resource_types.contains(resource_type) {
            return Err(BlobTourError::authorization(format!(
                "SAS token does not cover resource type {resource_type:?} needed for {operation:?}"
            )));
        }
        if !operation
            .accepted_permissions()
            .iter()
            .any(|p| self.permissions.contains(*p))
        {
            return Err(BlobTourError::authorization(format!(
                "SAS token lacks permission for {operation:?}"
            )));
        }

        Ok(())
    }

    fn string_to_sign(&self, account_name: &str) -> String {
        let mut to_sign = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            account_name,
            self.permissions,
            self.services,
            self.resource_types,
            self.start.map(format_sas_time).unwrap_or_default(),
            format_sas_time(self.expiry),
            self.ip.as_deref().unwrap_or_default(),
            self.protocol.map(|p| p.as_str()).unwrap_or_default(),
            self.version,
        );
        if self.version.as_str() >= ENCRYPTION_SCOPE_VERSION {
            to_sign.push('\n');
        }
        to_sign
    }
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("sv", &self.version)
            .append_pair("ss", &self.services.to_string())
            .append_pair("srt", &self.resource_types.to_string())
            .append_pair("sp", &self.permissions.to_string());
        if let Some(start) = self.start {
            query.append_pair("st", &format_sas_time(start));
        }
        query.append_pair("se", &format_sas_time(self.expiry));
        if let Some(ip) = &self.ip {
            query.append_pair("sip", ip);
        }
        if let Some(protocol) = self.protocol {
            query.append_pair("spr", protocol.as_str());
        }
        query.append_pair("sig", &self.signature);
        f.write_str(&query.finish())
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SasToken")
            .field("version", &self.version)
            .field("services", &self.services)
            .field("resource_types", &self.resource_types)
            .field("permissions", &self.permissions)
            .field("start", &self.start)
            .field("expiry", &self.expiry)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// Sign a policy with a base64 account key
pub fn sign_account_sas(
    account_name: &str,
    account_key: &str,
    policy: &AccountSasPolicy,
) -> Result<SasToken> {
    if policy.permissions.is_empty() || policy.services.is_empty() || policy.resource_types.is_empty()
    {
        return Err(BlobTourError::sas(
            "policy needs at least one permission, service and resource type",
        ));
    }
    if let Some(start) = policy.start {
        if start >= policy.expiry {
            return Err(BlobTourError::sas("policy start must precede its expiry"));
        }
    }

    let mut token = SasToken {
        version: ACCOUNT_SAS_VERSION.to_string(),
        services: policy.services,
        resource_types: policy.resource_types,
        permissions: policy.permissions,
        start: policy.start.map(whole_seconds),
        expiry: whole_seconds(policy.expiry),
        ip: policy.ip.clone(),
        protocol: policy.protocol,
        signature: String::new(),
    };
    let mac = new_mac(account_key, &token.string_to_sign(account_name))?;
    token.signature = STANDARD.encode(mac.finalize().into_bytes());
    Ok(token)
}

/// Issue an account SAS for a handle that holds the account key
pub fn generate_account_sas(
    account: &StorageAccount,
    policy: &AccountSasPolicy,
) -> Result<SasToken> {
    let key = account.account_key().ok_or_else(|| {
        BlobTourError::config("an account key is required to issue SAS tokens")
    })?;
    sign_account_sas(account.name(), key, policy)
}

fn new_mac(account_key: &str, data: &str) -> Result<HmacSha256> {
    let key = STANDARD
        .decode(account_key.as_bytes())
        .map_err(|_| BlobTourError::sas("account key is not valid base64"))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| BlobTourError::sas(format!("cannot key HMAC: {e}")))?;
    mac.update(data.as_bytes());
    Ok(mac)
}

fn whole_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0).unwrap_or(time)
}

fn format_sas_time(time: DateTime<Utc>) -> String {
    time.format(SAS_TIME_FORMAT).to_string()
}

fn parse_sas_time(param: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BlobTourError::sas(format!("invalid '{param}' timestamp '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_render_in_canonical_order() {
        let permissions: AccountSasPermissions = [
            SasPermission::Delete,
            SasPermission::Read,
            SasPermission::Create,
            SasPermission::List,
            SasPermission::Write,
        ]
        .into_iter()
        .collect();
        assert_eq!(permissions.to_string(), "rwdlc");
    }

    #[test]
    fn test_flags_parse() {
        let types = AccountSasResourceTypes::parse("co").unwrap();
        assert!(types.contains(SasResourceType::Container));
        assert!(types.contains(SasResourceType::Object));
        assert!(!types.contains(SasResourceType::Service));

        assert!(AccountSasResourceTypes::parse("cx").is_err());
        assert!(AccountSasResourceTypes::parse("cc").is_err());
        assert!(AccountSasResourceTypes::parse("").is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let policy = AccountSasPolicy::blob_container_and_objects(now, Duration::hours(24));
        let token = sign_account_sas("devstoreaccount1", crate::auth::DEV_STORE_ACCOUNT_KEY, &policy)
            .unwrap();

        assert!(!token.is_expired_at(token.expiry() - Duration::seconds(1)));
        assert!(token.is_expired_at(token.expiry()));
    }

    #[test]
    fn test_encryption_scope_line_for_newer_versions() {
        let now = Utc::now();
        let policy = AccountSasPolicy::blob_container_and_objects(now, Duration::hours(1));
        let mut token =
            sign_account_sas("acct", crate::auth::DEV_STORE_ACCOUNT_KEY, &policy).unwrap();
        assert!(!token.string_to_sign("acct").ends_with("\n\n"));

        token.version = "2021-08-06".to_string();
        assert!(token.string_to_sign("acct").ends_with("\n\n"));
    }
}
