//! Search backend abstraction and its HTTP implementation

use crate::search::config::BackendConfig;
use crate::search::document::RawHit;
use crate::search::error::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// `hits.total` is either a bare count or `{ "value": n, "relation": "eq" }`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(n) => *n,
            TotalHits::Object { value, .. } => *value,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

/// Body of a search or scroll response
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: HitsEnvelope,
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
}

impl SearchResponse {
    pub fn total_hits(&self) -> Option<u64> {
        self.hits.total.as_ref().map(TotalHits::value)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(flatten)]
    hit: Option<RawHit>,
}

/// Operations the executor needs from a search service
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a query; with `scroll_ttl` set the response carries a cursor id
    async fn search(
        &self,
        index: &str,
        body: &Value,
        scroll_ttl: Option<&str>,
    ) -> SearchResult<SearchResponse>;

    /// Fetch the next batch for an open cursor
    async fn scroll(&self, scroll_id: &str, ttl: &str) -> SearchResult<SearchResponse>;

    /// Release a cursor
    async fn clear_scroll(&self, scroll_id: &str) -> SearchResult<()>;

    /// Fetch one document by id
    async fn get(&self, index: &str, id: &str) -> SearchResult<Option<RawHit>>;
}

/// Elasticsearch/OpenSearch REST client
#[derive(Debug, Clone)]
pub struct HttpSearchBackend {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl HttpSearchBackend {
    pub fn new(config: &BackendConfig) -> SearchResult<Self> {
        let base_url = Url::parse(&config.endpoint).map_err(|e| {
            SearchError::InvalidConfiguration(format!(
                "invalid endpoint '{}': {}",
                config.endpoint, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SearchError::InvalidConfiguration(format!(
                "endpoint '{}' cannot carry a path",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("search-lens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                SearchError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> SearchResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SearchError::InvalidConfiguration(format!("endpoint '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> SearchResult<(StatusCode, String)> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    fn decode<T: for<'de> Deserialize<'de>>(status: StatusCode, body: &str) -> SearchResult<T> {
        if !status.is_success() {
            return Err(SearchError::from_status(status.as_u16(), body.to_string()));
        }
        Ok(serde_json::from_str(body)?)
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(
        &self,
        index: &str,
        body: &Value,
        scroll_ttl: Option<&str>,
    ) -> SearchResult<SearchResponse> {
        let mut url = self.url(&[index, "_search"])?;
        if let Some(ttl) = scroll_ttl {
            url.query_pairs_mut().append_pair("scroll", ttl);
        }
        debug!(%url, "Issuing search");

        let (status, text) = self.send(self.request(Method::POST, url).json(body)).await?;
        Self::decode(status, &text)
    }

    async fn scroll(&self, scroll_id: &str, ttl: &str) -> SearchResult<SearchResponse> {
        let url = self.url(&["_search", "scroll"])?;
        let body = json!({ "scroll": ttl, "scroll_id": scroll_id });

        let (status, text) = self.send(self.request(Method::POST, url).json(&body)).await?;
        Self::decode(status, &text)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> SearchResult<()> {
        let url = self.url(&["_search", "scroll"])?;
        let body = json!({ "scroll_id": [scroll_id] });

        let (status, text) = self.send(self.request(Method::DELETE, url).json(&body)).await?;
        if status == StatusCode::NOT_FOUND {
            // already expired on the server
            warn!(scroll_id, "Scroll context not found while clearing");
            return Ok(());
        }
        if !status.is_success() {
            return Err(SearchError::from_status(status.as_u16(), text));
        }
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> SearchResult<Option<RawHit>> {
        let url = self.url(&[index, "_doc", id])?;

        let (status, text) = self.send(self.request(Method::GET, url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response: GetResponse = Self::decode(status, &text)?;
        Ok(response.hit.filter(|_| response.found))
    }
}
