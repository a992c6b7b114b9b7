// # Cloudflare DNS Provider
//
// Cloudflare implementation of peerscanner's zone operations: list every
// record of the managed domain, create A/AAAA records and destroy records.
//
// ## Behavior
//
// - One logical operation per call; errors are returned as-is. Retry and
//   backoff belong to the host lifecycle.
// - Listing follows pagination until `result_info.total_pages` is reached.
// - The zone ID is resolved once from the domain unless configured.
// - HTTP timeout of 30 seconds.
// - Dry-run mode lists normally but only logs creates and destroys.
//
// ## Authentication
//
// - API token: `Authorization: Bearer <token>`
// - Global API key: `X-Auth-Email` + `X-Auth-Key`
//
// Credentials never appear in logs or Debug output.
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=N&per_page=100`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use peerscanner_core::config::ProviderConfig;
use peerscanner_core::traits::{DnsProvider, DnsProviderFactory, Record, RecordSpec};
use peerscanner_core::{Error, ProviderRegistry, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per listing page (the API maximum for this endpoint)
const PAGE_SIZE: u32 = 100;

const PROVIDER: &str = "cloudflare";

/// How requests are authenticated
#[derive(Clone)]
pub enum CloudflareAuth {
    /// Scoped API token with Zone:DNS:Edit permission
    Token(String),
    /// Account email and global API key
    GlobalKey { email: String, key: String },
}

impl CloudflareAuth {
    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            CloudflareAuth::Token(token) => request.bearer_auth(token),
            CloudflareAuth::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CloudflareAuth::Token(_) => "api-token",
            CloudflareAuth::GlobalKey { .. } => "global-key",
        }
    }
}

impl std::fmt::Debug for CloudflareAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(<REDACTED>)", self.kind())
    }
}

/// Envelope wrapping every Cloudflare v4 response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    ttl: Option<u32>,
}

/// Cloudflare DNS provider for one managed domain
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, listing)
/// - Log the intended POST/DELETE
/// - **NOT** modify DNS records
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    auth: CloudflareAuth,

    domain: String,

    /// Configured or resolved on first use
    zone_id: OnceCell<String>,

    client: reqwest::Client,

    base_url: String,

    dry_run: bool,

    /// Source of ids for records "created" in dry-run mode
    dry_run_ids: AtomicU64,
}

// Custom Debug implementation that hides credentials
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("auth", &self.auth)
            .field("domain", &self.domain)
            .field("zone_id", &self.zone_id.get())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider for `domain`
    ///
    /// # Parameters
    ///
    /// - `auth`: Credentials; must not be empty
    /// - `domain`: The managed domain, e.g. `getiantem.org`
    /// - `zone_id`: Optional zone ID (looked up from `domain` otherwise)
    /// - `dry_run`: If true, perform GET requests but skip changes
    pub fn new(
        auth: CloudflareAuth,
        domain: impl Into<String>,
        zone_id: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let empty = match &auth {
            CloudflareAuth::Token(token) => token.is_empty(),
            CloudflareAuth::GlobalKey { email, key } => email.is_empty() || key.is_empty(),
        };
        if empty {
            return Err(Error::config("Cloudflare credentials cannot be empty"));
        }

        let domain = domain.into().trim_end_matches('.').to_lowercase();
        if domain.is_empty() {
            return Err(Error::config("Cloudflare domain cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            auth,
            domain,
            zone_id: OnceCell::new_with(zone_id.filter(|id| !id.is_empty())),
            client,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            dry_run,
            dry_run_ids: AtomicU64::new(1),
        })
    }

    /// Point the provider at a different API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Get the zone ID, looking it up on first use
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// ```
    async fn zone_id(&self) -> Result<&str> {
        let id = self
            .zone_id
            .get_or_try_init(|| async {
                tracing::debug!("Looking up zone ID for domain: {}", self.domain);
                let url = format!("{}/zones?name={}", self.base_url, self.domain);
                let envelope: Envelope<Vec<Zone>> =
                    self.send(self.client.get(&url), "Zone lookup").await?;
                let zone = envelope
                    .result
                    .unwrap_or_default()
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::not_found(format!("Zone not found: {}", self.domain)))?;
                tracing::debug!("Found zone ID: {}", zone.id);
                Ok::<_, Error>(zone.id)
            })
            .await?;
        Ok(id.as_str())
    }

    /// Send an authenticated request and decode the response envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<Envelope<T>> {
        let response = self
            .auth
            .apply(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status.as_u16(), operation, &body));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("Failed to parse {} response: {}", operation, e))
        })?;
        if !envelope.success {
            return Err(Error::provider(
                PROVIDER,
                format!("{} failed: {}", operation, describe(&envelope.errors)),
            ));
        }
        Ok(envelope)
    }

    fn to_record(&self, raw: DnsRecord) -> Record {
        Record {
            name: relative_name(&raw.name, &self.domain),
            id: raw.id,
            value: raw.content,
            full_name: raw.name,
            record_type: raw.record_type,
            ttl: raw.ttl,
        }
    }

    fn full_name(&self, name: &str) -> String {
        if name == "@" || name.is_empty() {
            self.domain.clone()
        } else {
            format!("{}.{}", name, self.domain)
        }
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// List every record in the zone, following pagination
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?page=1&per_page=100
    /// ```
    async fn list_all_records(&self) -> Result<Vec<Record>> {
        let zone_id = self.zone_id().await?;
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}/zones/{}/dns_records?page={}&per_page={}",
                self.base_url, zone_id, page, PAGE_SIZE
            );
            let envelope: Envelope<Vec<DnsRecord>> =
                self.send(self.client.get(&url), "Record listing").await?;

            let batch = envelope.result.unwrap_or_default();
            let fetched = batch.len();
            records.extend(batch.into_iter().map(|raw| self.to_record(raw)));

            let total_pages = envelope.result_info.map(|info| info.total_pages).unwrap_or(0);
            if page >= total_pages || fetched == 0 {
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} records of {}", records.len(), self.domain);
        Ok(records)
    }

    /// Create an A or AAAA record
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "A", "name": "peer-x.example.com", "content": "1.2.3.4", "ttl": 120, "proxied": false}
    /// ```
    async fn create_record(&self, spec: &RecordSpec) -> Result<Record> {
        let full_name = self.full_name(&spec.name);
        let payload = serde_json::json!({
            "type": spec.record_type(),
            "name": full_name,
            "content": spec.value.to_string(),
            "ttl": spec.ttl,
            "proxied": false,
        });

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would create record: {}", payload);
            return Ok(Record {
                id: format!("dry-run-{}", self.dry_run_ids.fetch_add(1, Ordering::Relaxed)),
                name: spec.name.clone(),
                value: spec.value.to_string(),
                full_name,
                record_type: spec.record_type().to_string(),
                ttl: Some(spec.ttl),
            });
        }

        let zone_id = self.zone_id().await?;
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        let envelope: Envelope<DnsRecord> = self
            .send(self.client.post(&url).json(&payload), "Record creation")
            .await?;
        let created = envelope.result.ok_or_else(|| {
            Error::provider(PROVIDER, "Invalid response format: missing created record")
        })?;

        tracing::debug!("Created {} {} -> {}", created.record_type, created.name, created.content);
        Ok(self.to_record(created))
    }

    /// Delete a record by ID
    ///
    /// ```http
    /// DELETE /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn destroy_record(&self, record: &Record) -> Result<()> {
        if record.id.is_empty() {
            return Err(Error::invalid_input(format!(
                "Record {} has no ID",
                record.full_name
            )));
        }

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would delete record {} ({} -> {})",
                record.id,
                record.full_name,
                record.value
            );
            return Ok(());
        }

        let zone_id = self.zone_id().await?;
        let url = format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record.id);
        let _: Envelope<serde_json::Value> =
            self.send(self.client.delete(&url), "Record deletion").await?;

        tracing::debug!("Deleted {} ({} -> {})", record.id, record.full_name, record.value);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Map an unsuccessful HTTP status to an error
fn status_error(status: u16, operation: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{} failed: invalid credentials or insufficient permissions. Status: {}",
            operation, status
        )),
        404 => Error::not_found(format!("{} failed: not found", operation)),
        429 => Error::rate_limited(format!(
            "{} failed: rate limit exceeded. Status: {}",
            operation, status
        )),
        500..=599 => Error::http(format!(
            "Cloudflare server error (transient) during {}: {} - {}",
            operation, status, body
        )),
        _ => Error::provider(PROVIDER, format!("{} failed: {} - {}", operation, status, body)),
    }
}

fn describe(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Strip the managed domain from a fully qualified name
///
/// The apex maps to `"@"`. Names outside the domain are returned unchanged.
fn relative_name(full_name: &str, domain: &str) -> String {
    let full_name = full_name.trim_end_matches('.');
    let lower = full_name.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    if lower == domain {
        return "@".to_string();
    }
    match lower.strip_suffix(domain.as_str()) {
        // ASCII lowercasing keeps byte offsets, so the prefix length holds for `full_name`
        Some(head) if head.len() > 1 && head.ends_with('.') => {
            full_name[..head.len() - 1].to_string()
        }
        _ => full_name.to_string(),
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig, domain: &str) -> Result<Box<dyn DnsProvider>> {
        let ProviderConfig::Cloudflare {
            api_token,
            email,
            api_key,
            zone_id,
        } = config
        else {
            return Err(Error::config("Invalid config for Cloudflare provider"));
        };

        let auth = match (api_token, email, api_key) {
            (Some(token), _, _) if !token.is_empty() => CloudflareAuth::Token(token.clone()),
            (_, Some(email), Some(key)) => CloudflareAuth::GlobalKey {
                email: email.clone(),
                key: key.clone(),
            },
            _ => {
                return Err(Error::config(
                    "Cloudflare API token, or email and API key, are required",
                ));
            }
        };

        // Check for dry-run mode environment variable
        let dry_run = std::env::var("PEERSCANNER_MODE")
            .unwrap_or_default()
            .eq_ignore_ascii_case("dry-run");
        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        let provider = CloudflareProvider::new(auth, domain, zone_id.clone(), dry_run)?;
        tracing::info!(
            "Using Cloudflare for {} ({} auth)",
            provider.domain(),
            provider.auth.kind()
        );
        Ok(Box::new(provider))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use peerscanner_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// peerscanner_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(CloudflareFactory));
}
