// # HTTP Address Observer
//
// This crate provides an AddressObserver backed by plain-text "what is my
// IP" services.
//
// ## Behavior
//
// Each configured URL is tried in order. The first successful (2xx) response
// whose trimmed body parses as an IP literal wins; that trimmed text becomes
// the published address. Only when every service fails does observation
// fail, and then nothing is published for the pass.
//
// ## Caching
//
// There is none. Every `observe()` hits the network, because the connector
// already compares against the last published address.

use allowsync_core::ComponentRegistry;
use allowsync_core::config::ObserverConfig;
use allowsync_core::model::Address;
use allowsync_core::traits::{AddressObserver, AddressObserverFactory};
use allowsync_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// HTTP-based address observer with ordered failover
#[derive(Debug)]
pub struct HttpObserver {
    /// Services to ask, in order
    urls: Vec<String>,

    /// HTTP client with the per-request timeout applied
    client: reqwest::Client,
}

impl HttpObserver {
    /// Create a new HTTP observer
    ///
    /// # Parameters
    ///
    /// - `urls`: Services returning the caller's address as the body
    /// - `timeout`: Per-request timeout
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("HTTP observer needs at least one URL"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { urls, client })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Ask a single service
    async fn fetch(&self, url: &str) -> Result<Address> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::observe_unavailable(format!("{}: request failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::observe_unavailable(format!(
                "{}: HTTP error: {}",
                url,
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            Error::observe_unavailable(format!("{}: failed to read response: {}", url, e))
        })?;

        parse_address(&body).ok_or_else(|| {
            Error::observe_unavailable(format!(
                "{}: invalid IP address: {:?}",
                url,
                body.trim()
            ))
        })
    }
}

/// Accept a body only if, once trimmed, it is a bare IP literal
fn parse_address(body: &str) -> Option<Address> {
    let text = body.trim();
    text.parse::<IpAddr>().ok().map(|_| Address::new(text))
}

#[async_trait::async_trait]
impl AddressObserver for HttpObserver {
    async fn observe(&self) -> Result<Address> {
        let mut failures = Vec::with_capacity(self.urls.len());

        for url in &self.urls {
            match self.fetch(url).await {
                Ok(address) => {
                    tracing::debug!("Observed address {} via {}", address, url);
                    return Ok(address);
                }
                Err(e) => {
                    tracing::warn!("Address service failed, trying next: {}", e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(Error::observe_unavailable(format!(
            "all {} service(s) failed: {}",
            self.urls.len(),
            failures.join("; ")
        )))
    }

    fn observer_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP observers
pub struct HttpObserverFactory;

impl AddressObserverFactory for HttpObserverFactory {
    fn create(&self, config: &ObserverConfig) -> Result<Box<dyn AddressObserver>> {
        match config {
            ObserverConfig::Http { urls, timeout_secs } => Ok(Box::new(HttpObserver::new(
                urls.clone(),
                Duration::from_secs(*timeout_secs),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP observer")),
        }
    }
}

/// Register the HTTP observer with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_observer("http", Box::new(HttpObserverFactory));
}
