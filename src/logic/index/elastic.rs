//! Elasticsearch Client
//!
//! Thin REST client over the handful of endpoints the pipeline needs.
//! Every call goes through the retry policy; only transient failures
//! (connect errors, timeouts, 429, 5xx) are retried.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{
    BulkFailure, BulkOutcome, FieldPatch, MissingFieldQuery, SearchIndex, SearchPage, SortKey,
    StoredDocument,
};
use crate::config::ElasticConfig;
use crate::error::{Dependency, DependencyError, FatalConfigError};
use crate::logic::features::{fields, FeatureDocument};
use crate::logic::retry::RetryPolicy;

const SERVICE: Dependency = Dependency::SearchIndex;

/// Largest page Elasticsearch serves without scroll
const MAX_PAGE: usize = 10_000;

/// Optimistic-concurrency retries for `_update`
const RETRY_ON_CONFLICT: u32 = 3;

#[derive(Debug, Clone)]
enum Auth {
    None,
    ApiKey(String),
    Basic(String, Option<String>),
}

// Response types

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterInfo {
    #[serde(default)]
    pub cluster_name: String,
    pub version: ClusterVersion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterVersion {
    pub number: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    sort: Value,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Elasticsearch-backed `SearchIndex`
pub struct ElasticIndex {
    base_url: Url,
    index: String,
    auth: Auth,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl ElasticIndex {
    pub fn new(config: &ElasticConfig, retry: RetryPolicy) -> Result<Self, FatalConfigError> {
        let base_url = Url::parse(&config.url).map_err(|e| FatalConfigError::Invalid {
            option: "ES_URL",
            reason: e.to_string(),
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_certs)
            .build()
            .map_err(|e| FatalConfigError::HttpClient {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let auth = match (&config.api_key, &config.username) {
            (Some(key), _) => Auth::ApiKey(key.clone()),
            (None, Some(user)) => Auth::Basic(user.clone(), config.password.clone()),
            (None, None) => Auth::None,
        };

        Ok(Self {
            base_url,
            index: config.index.clone(),
            auth,
            retry,
            http_client,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Base URL plus percent-encoded path segments
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.auth {
            Auth::None => builder,
            Auth::ApiKey(key) => builder.header(reqwest::header::AUTHORIZATION, format!("ApiKey {}", key)),
            Auth::Basic(user, pass) => builder.basic_auth(user, pass.as_ref()),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, DependencyError> {
        let response = builder
            .send()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DependencyError::from_status(SERVICE, status.as_u16(), body))
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, DependencyError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| DependencyError::from_reqwest(SERVICE, e))
    }

    /// Cluster name and version
    pub async fn info(&self) -> Result<ClusterInfo, DependencyError> {
        self.retry
            .run("elasticsearch.info", || {
                self.send_json(self.request(Method::GET, self.url(&[])))
            })
            .await
    }

    /// Create the index with the explicit mapping if it does not exist.
    /// Returns `true` when the index was created by this call.
    pub async fn ensure_index(&self) -> Result<bool, DependencyError> {
        let exists = self
            .retry
            .run("elasticsearch.index_exists", || async {
                let response = self
                    .request(Method::HEAD, self.url(&[self.index.as_str()]))
                    .send()
                    .await
                    .map_err(|e| DependencyError::from_reqwest(SERVICE, e))?;
                match response.status() {
                    StatusCode::OK => Ok(true),
                    StatusCode::NOT_FOUND => Ok(false),
                    other => Err(DependencyError::from_status(SERVICE, other.as_u16(), "HEAD index")),
                }
            })
            .await?;

        if exists {
            debug!(index = %self.index, "index already exists");
            return Ok(false);
        }

        let body = index_mapping();
        let created = self
            .retry
            .run("elasticsearch.create_index", || async {
                match self.send(self.request(Method::PUT, self.url(&[self.index.as_str()])).json(&body)).await {
                    Ok(_) => Ok(true),
                    // Another process created it in between
                    Err(DependencyError::Rejected { status: 400, message, .. })
                        if message.contains("resource_already_exists_exception") =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;

        if created {
            info!(index = %self.index, "created index with feature mapping");
        }
        Ok(created)
    }

    /// Make recent writes visible to search
    pub async fn refresh(&self) -> Result<(), DependencyError> {
        self.retry
            .run("elasticsearch.refresh", || async {
                self.send(self.request(Method::POST, self.url(&[self.index.as_str(), "_refresh"])))
                    .await
                    .map(|_| ())
            })
            .await
    }

    async fn search(&self, body: &Value) -> Result<Vec<Hit>, DependencyError> {
        let response: SearchResponse = self
            .retry
            .run("elasticsearch.search", || {
                self.send_json(
                    self.request(Method::POST, self.url(&[self.index.as_str(), "_search"]))
                        .json(body),
                )
            })
            .await?;
        Ok(response.hits.hits)
    }
}

/// Decode hits; sources that are not feature documents are skipped
fn decode_hits(hits: Vec<Hit>) -> SearchPage {
    let count = hits.len();
    let mut last_sort = None;
    let mut docs = Vec::with_capacity(count);

    for hit in hits {
        let sort = SortKey::from_json(&hit.sort);
        match serde_json::from_value::<FeatureDocument>(hit.source) {
            Ok(doc) => {
                let sort = sort.unwrap_or_else(|| SortKey::of(&doc));
                last_sort = Some(sort.clone());
                docs.push(StoredDocument { id: hit.id, sort, doc });
            }
            Err(e) => {
                warn!(doc_id = %hit.id, error = %e, "skipping undecodable document");
                if sort.is_some() {
                    last_sort = sort;
                }
            }
        }
    }

    SearchPage {
        docs,
        hits: count,
        last_sort,
    }
}

fn bulk_body(index: &str, docs: &[FeatureDocument]) -> String {
    let mut body = String::new();
    for doc in docs {
        let action = json!({ "update": { "_index": index, "_id": doc.doc_id() } });
        let source = json!({ "doc": doc, "doc_as_upsert": true });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&source.to_string());
        body.push('\n');
    }
    body
}

fn error_reason(error: &Option<Value>) -> String {
    match error {
        Some(e) => e
            .get("reason")
            .or_else(|| e.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string()),
        None => "unknown error".to_string(),
    }
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn upsert_batch(&self, docs: &[FeatureDocument]) -> Result<BulkOutcome, DependencyError> {
        if docs.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = bulk_body(&self.index, docs);
        let response: BulkResponse = self
            .retry
            .run("elasticsearch.bulk", || {
                self.send_json(
                    self.request(Method::POST, self.url(&[self.index.as_str(), "_bulk"]))
                        .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                        .body(body.clone()),
                )
            })
            .await?;

        let mut outcome = BulkOutcome::default();
        let mut reported = HashSet::new();
        for item in response.items.into_iter().flat_map(|m| m.into_values()) {
            reported.insert(item.id.clone());
            if (200..300).contains(&item.status) {
                outcome.written += 1;
            } else {
                outcome.failed.push(BulkFailure {
                    reason: error_reason(&item.error),
                    id: item.id,
                    status: item.status,
                });
            }
        }

        // Items ES did not report on count as failed
        for doc in docs {
            let id = doc.doc_id();
            if !reported.contains(&id) {
                outcome.failed.push(BulkFailure {
                    id,
                    status: 0,
                    reason: "missing from bulk response".to_string(),
                });
            }
        }

        if response.errors {
            debug!(
                written = outcome.written,
                failed = outcome.failed.len(),
                "bulk upsert finished with item errors"
            );
        }

        Ok(outcome)
    }

    async fn find_missing(&self, query: &MissingFieldQuery) -> Result<SearchPage, DependencyError> {
        let mut filter = Vec::new();
        if let Some(window) = &query.time_window {
            filter.push(json!({ "range": { (fields::TIMESTAMP): { "gte": window } } }));
        }

        let mut body = json!({
            "size": query.size.min(MAX_PAGE),
            "track_total_hits": false,
            "sort": SortKey::sort_clause(),
            "query": {
                "bool": {
                    "must_not": [{ "exists": { "field": query.field } }],
                    "filter": filter,
                }
            }
        });
        if let Some(after) = &query.after {
            body["search_after"] = after.to_json();
        }

        let hits = self.search(&body).await?;
        Ok(decode_hits(hits))
    }

    async fn update_fields(&self, id: &str, patch: &FieldPatch) -> Result<(), DependencyError> {
        let mut url = self.url(&[self.index.as_str(), "_update", id]);
        url.query_pairs_mut()
            .append_pair("retry_on_conflict", &RETRY_ON_CONFLICT.to_string());
        let body = json!({ "doc": patch.to_partial() });

        self.retry
            .run("elasticsearch.update", || async {
                self.send(self.request(Method::POST, url.clone()).json(&body))
                    .await
                    .map(|_| ())
            })
            .await
    }

    async fn find_with_fields(
        &self,
        required: &[&str],
        limit: usize,
    ) -> Result<Vec<StoredDocument>, DependencyError> {
        let exists: Vec<Value> = required
            .iter()
            .map(|f| json!({ "exists": { "field": f } }))
            .collect();

        let mut out = Vec::new();
        let mut after: Option<SortKey> = None;
        while out.len() < limit {
            let size = (limit - out.len()).min(MAX_PAGE);
            let mut body = json!({
                "size": size,
                "track_total_hits": false,
                "sort": SortKey::sort_clause(),
                "query": { "bool": { "filter": exists } }
            });
            if let Some(key) = &after {
                body["search_after"] = key.to_json();
            }

            let page = decode_hits(self.search(&body).await?);
            let short = page.hits < size;
            after = page.last_sort.clone();
            out.extend(page.docs);
            if short || after.is_none() {
                break;
            }
        }
        Ok(out)
    }
}

/// Explicit mapping: keyword identities, date timestamps, numeric metrics
pub fn index_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic": true,
            "properties": {
                "@timestamp": { "type": "date" },
                "sensor": {
                    "properties": {
                        "id": { "type": "keyword" },
                        "site": { "type": "keyword" }
                    }
                },
                "bssid": { "type": "keyword" },
                "window_start": { "type": "date" },
                "ssid": { "type": "keyword" },
                "manuf": { "type": "keyword" },
                "channel": { "type": "keyword" },
                "phyname": { "type": "keyword" },
                "device_type": { "type": "keyword" },
                "first_seen": { "type": "date" },
                "last_seen": { "type": "date" },
                "rssi_last": { "type": "integer" },
                "rssi_min": { "type": "integer" },
                "rssi_max": { "type": "integer" },
                "rssi_mean": { "type": "float" },
                "client_count": { "type": "integer" },
                "packets_total": { "type": "long" },
                "ssid_entropy": { "type": "float" },
                "anomaly_score": { "type": "float" },
                "anomaly_label": { "type": "keyword" },
                "anomaly_model": { "type": "keyword" },
                "context": {
                    "properties": {
                        "summary": { "type": "text" },
                        "summary_generated_at": { "type": "date" },
                        "summary_model": { "type": "keyword" }
                    }
                }
            }
        }
    })
}
