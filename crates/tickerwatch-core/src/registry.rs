//! # Ticker Registry
//!
//! Immutable set of valid symbols, loaded once per run from the SEC company
//! ticker list with a local JSON cache as fallback.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::http_client::{HttpClient, HttpRequest, DEFAULT_USER_AGENT};
use crate::{normalize, RegistryError, Ticker};

pub const SEC_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// Membership set of valid tickers. Never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerRegistry {
    symbols: BTreeSet<Ticker>,
}

impl TickerRegistry {
    /// Builds a registry, silently dropping entries that are not valid tickers.
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbols: symbols
                .into_iter()
                .filter_map(|symbol| Ticker::parse(symbol.as_ref()).ok())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Membership after trimming, stripping a leading `$` and uppercasing.
    pub fn is_valid(&self, candidate: &str) -> bool {
        Ticker::parse(&normalize(candidate)).is_ok_and(|ticker| self.symbols.contains(&ticker))
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.symbols.contains(ticker)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticker> {
        self.symbols.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrySource {
    Live,
    Cache,
}

impl RegistrySource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cache => "cache",
        }
    }
}

/// A loaded registry and where it came from.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub registry: Arc<TickerRegistry>,
    pub source: RegistrySource,
    /// Why the live source was not used, when the cache served the run.
    pub live_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecCompany {
    ticker: String,
}

/// Loads the registry: live source first, cache second.
pub struct RegistryLoader {
    http: Arc<dyn HttpClient>,
    url: String,
    cache_path: PathBuf,
    contact_email: Option<String>,
    timeout_ms: u64,
}

impl RegistryLoader {
    pub fn new(http: Arc<dyn HttpClient>, cache_path: impl Into<PathBuf>) -> Self {
        Self {
            http,
            url: SEC_TICKERS_URL.to_string(),
            cache_path: cache_path.into(),
            contact_email: None,
            timeout_ms: 15_000,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// The SEC rejects requests whose User-Agent carries no contact address.
    pub fn with_contact_email(mut self, email: Option<String>) -> Self {
        self.contact_email = email.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub async fn load(&self) -> Result<RegistrySnapshot, RegistryError> {
        let live_error = match self.load_live().await {
            Ok(registry) => {
                info!(url = %self.url, tickers = registry.len(), "loaded live ticker registry");
                if let Err(error) = self.write_cache(&registry) {
                    warn!(path = %self.cache_path.display(), error = %error, "failed to refresh ticker cache");
                }
                return Ok(RegistrySnapshot {
                    registry: Arc::new(registry),
                    source: RegistrySource::Live,
                    live_error: None,
                });
            }
            Err(error) => error,
        };

        warn!(url = %self.url, error = %live_error, "live ticker registry unavailable; using cache");
        match self.read_cache() {
            Ok(registry) => {
                info!(path = %self.cache_path.display(), tickers = registry.len(), "loaded cached ticker registry");
                Ok(RegistrySnapshot {
                    registry: Arc::new(registry),
                    source: RegistrySource::Cache,
                    live_error: Some(live_error),
                })
            }
            Err(cache_error) => Err(RegistryError::Unavailable {
                live: live_error,
                cache: cache_error,
            }),
        }
    }

    fn user_agent(&self) -> String {
        match &self.contact_email {
            Some(email) => format!("{DEFAULT_USER_AGENT} {email}"),
            None => DEFAULT_USER_AGENT.to_string(),
        }
    }

    async fn load_live(&self) -> Result<TickerRegistry, String> {
        let request = HttpRequest::get(&self.url)
            .with_header("user-agent", self.user_agent())
            .with_header("accept", "application/json")
            .with_timeout_ms(self.timeout_ms);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("status {}", response.status));
        }

        let companies: HashMap<String, SecCompany> =
            serde_json::from_str(&response.body).map_err(|e| format!("invalid payload: {e}"))?;
        let registry = TickerRegistry::from_symbols(companies.values().map(|c| c.ticker.as_str()));
        if registry.is_empty() {
            return Err(String::from("payload contained no valid tickers"));
        }
        Ok(registry)
    }

    fn read_cache(&self) -> Result<TickerRegistry, String> {
        let raw = std::fs::read_to_string(&self.cache_path)
            .map_err(|e| format!("{}: {e}", self.cache_path.display()))?;
        let symbols: Vec<String> =
            serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", self.cache_path.display()))?;
        let registry = TickerRegistry::from_symbols(symbols);
        if registry.is_empty() {
            return Err(format!("{}: cache is empty", self.cache_path.display()));
        }
        Ok(registry)
    }

    fn write_cache(&self, registry: &TickerRegistry) -> std::io::Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let symbols: Vec<&str> = registry.iter().map(Ticker::as_str).collect();
        let json = serde_json::to_string(&symbols)?;

        let staging = self.cache_path.with_extension("json.tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, &self.cache_path)
    }
}
