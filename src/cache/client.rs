//! Async driver tying the cache controller to a [`Transport`].
//!
//! Every fetch runs in three steps: begin (write lock), fetch (no lock),
//! settle (write lock). Locks are never held across an `.await`.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::future::join_all;
use metrics::histogram;
use tracing::{debug, instrument};

use crate::application::transport::Transport;
use crate::domain::query::Query;
use crate::domain::{Record, RecordId};

use super::config::CacheConfig;
use super::controller::{CacheController, PageTicket};
use super::error::CacheError;
use super::keys::Fingerprint;
use super::lock::{rw_read, rw_write};
use super::selectors::ResultView;
use super::state::Transition;

const SOURCE: &str = "cache::client";
pub(crate) const METRIC_FETCH_MS: &str = "folio_cache_fetch_ms";

/// Cache controller shared between tasks.
#[derive(Clone, Default)]
pub struct SharedCache {
    inner: Arc<RwLock<CacheController>>,
}

impl SharedCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::from_controller(CacheController::new(config))
    }

    pub fn from_controller(controller: CacheController) -> Self {
        Self {
            inner: Arc::new(RwLock::new(controller)),
        }
    }

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&CacheController) -> R) -> R {
        f(&rw_read(&self.inner, SOURCE, "read"))
    }

    /// Run `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut CacheController) -> R) -> R {
        f(&mut rw_write(&self.inner, SOURCE, "write"))
    }

    pub fn select(&self, fingerprint: &Fingerprint) -> ResultView {
        self.read(|cache| cache.select(fingerprint))
    }

    pub fn can_request_next(&self, fingerprint: &Fingerprint) -> bool {
        self.read(|cache| cache.can_request_next(fingerprint))
    }

    pub fn record(&self, id: &RecordId) -> Option<Record> {
        self.read(|cache| cache.object(id).record.clone())
    }

    pub fn delete_object(&self, id: &RecordId) -> Result<Transition, CacheError> {
        self.write(|cache| cache.delete_object(id))
    }

    pub fn invalidate_all(&self) -> usize {
        self.write(CacheController::invalidate_all)
    }
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache").finish_non_exhaustive()
    }
}

/// Fetches through a [`Transport`] and settles the outcome in the cache.
pub struct CacheClient<T> {
    cache: SharedCache,
    transport: T,
}

impl<T: Transport> CacheClient<T> {
    pub fn new(cache: SharedCache, transport: T) -> Self {
        Self { cache, transport }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Load the first page of `query` if its window was never requested.
    ///
    /// Returns `Ok(None)` when nothing was fetched or the page arrived for a
    /// window invalidated in the meantime.
    #[instrument(skip(self, query), fields(resource = query.resource()))]
    pub async fn fetch_if_needed(&self, query: &Query) -> Result<Option<Transition>, CacheError> {
        let Some(ticket) = self.cache.write(|cache| cache.begin_load(query)) else {
            return Ok(None);
        };
        self.settle(query, ticket).await
    }

    /// Explicitly re-request the first page of `query`.
    ///
    /// This is the only way out of a failed window; `fetch_if_needed` leaves
    /// failed windows alone. Returns `Ok(None)` while a page is in flight.
    #[instrument(skip(self, query), fields(resource = query.resource()))]
    pub async fn reload(&self, query: &Query) -> Result<Option<Transition>, CacheError> {
        let Some(ticket) = self.cache.write(|cache| cache.reload(query)) else {
            return Ok(None);
        };
        self.settle(query, ticket).await
    }

    /// Load the page after the last one merged for `query`.
    #[instrument(skip(self, query), fields(resource = query.resource()))]
    pub async fn fetch_next(&self, query: &Query) -> Result<Option<Transition>, CacheError> {
        let fingerprint = query.fingerprint();
        let ticket = self
            .cache
            .write(|cache| cache.begin_next_page(&fingerprint))?;
        self.settle(query, ticket).await
    }

    /// Retry a failed continuation page for `query`.
    #[instrument(skip(self, query), fields(resource = query.resource()))]
    pub async fn retry_next(&self, query: &Query) -> Result<Option<Transition>, CacheError> {
        let fingerprint = query.fingerprint();
        let ticket = self
            .cache
            .write(|cache| cache.retry_next_page(&fingerprint))?;
        self.settle(query, ticket).await
    }

    async fn settle(
        &self,
        query: &Query,
        ticket: PageTicket,
    ) -> Result<Option<Transition>, CacheError> {
        let started_at = Instant::now();
        let outcome = self.transport.fetch_page(query, &ticket.request).await;
        histogram!(METRIC_FETCH_MS, "scope" => "page")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let settled = match outcome {
            Ok(page) => self.cache.write(|cache| cache.complete_page(&ticket, page)),
            Err(error) => {
                let failed = self
                    .cache
                    .write(|cache| cache.fail_page(&ticket, error.clone()));
                failed.and(Err(CacheError::Fetch(error)))
            }
        };

        match settled {
            Ok(transition) => Ok(Some(transition)),
            Err(err) if err.is_stale() => {
                debug!(
                    window = %ticket.fingerprint.digest(),
                    "Ignoring page for invalidated window"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch a single record, unless a fetch for it is already in flight.
    ///
    /// Returns the cached record after merging, or `None` when another fetch
    /// owns the load.
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn fetch_object(&self, id: &RecordId) -> Result<Option<Record>, CacheError> {
        if !self.cache.write(|cache| cache.begin_object_load(id)) {
            return Ok(None);
        }

        let started_at = Instant::now();
        let outcome = self.transport.fetch_record(id).await;
        histogram!(METRIC_FETCH_MS, "scope" => "object")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            Ok(record) => Ok(self.cache.write(|cache| {
                cache.complete_object_load(record);
                cache.object(id).record.clone()
            })),
            Err(error) => {
                self.cache
                    .write(|cache| cache.fail_object_load(id, error.clone()));
                Err(CacheError::Fetch(error))
            }
        }
    }

    /// Fetch every record in `ids` the store has never seen, concurrently.
    ///
    /// Failures are recorded per record; returns how many were loaded.
    pub async fn fetch_objects(&self, ids: &[RecordId]) -> usize {
        let wanted: Vec<&RecordId> = self.cache.read(|cache| {
            ids.iter()
                .filter(|id| cache.object(id).should_load())
                .collect()
        });

        let outcomes = join_all(wanted.into_iter().map(|id| self.fetch_object(id))).await;
        outcomes
            .into_iter()
            .filter(|outcome| matches!(outcome, Ok(Some(_))))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::error::FetchError;
    use crate::domain::{PageRequest, PageResponse, RecordKind};

    /// Serves scripted pages keyed by offset and counts requests.
    #[derive(Default)]
    struct ScriptedTransport {
        pages: HashMap<u32, Result<PageResponse, FetchError>>,
        calls: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedTransport {
        fn page(mut self, offset: u32, ids: &[&str], next: Option<&str>) -> Self {
            let records = ids
                .iter()
                .map(|id| Record::new(*id, RecordKind::Entity))
                .collect();
            self.pages.insert(
                offset,
                Ok(PageResponse::new(offset, 2, records, next.map(str::to_string))),
            );
            self
        }

        fn failure(mut self, offset: u32, error: FetchError) -> Self {
            self.pages.insert(offset, Err(error));
            self
        }

        fn calls(&self) -> usize {
            self.calls.lock().expect("calls lock").len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch_page(
            &self,
            _query: &Query,
            page: &PageRequest,
        ) -> Result<PageResponse, FetchError> {
            self.calls.lock().expect("calls lock").push(page.clone());
            self.pages
                .get(&page.offset)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::not_found("no such page")))
        }

        async fn fetch_record(&self, id: &RecordId) -> Result<Record, FetchError> {
            if id.as_str() == "missing" {
                return Err(FetchError::not_found("gone"));
            }
            Ok(Record::new(id.clone(), RecordKind::Entity).with_field("fetched", true))
        }
    }

    fn query() -> Query {
        Query::new("search").text("ports").limit(2)
    }

    fn ids(client: &CacheClient<ScriptedTransport>) -> Vec<String> {
        client
            .cache()
            .select(&query().fingerprint())
            .results
            .iter()
            .map(|record| record.id.to_string())
            .collect()
    }

    #[tokio::test]
    async fn fetch_if_needed_fetches_once() {
        let transport = ScriptedTransport::default().page(0, &["a", "b"], Some("tok1"));
        let client = CacheClient::new(SharedCache::default(), transport);

        let first = client.fetch_if_needed(&query()).await.expect("fetch");
        assert!(matches!(first, Some(Transition::PageMerged { .. })));
        let second = client.fetch_if_needed(&query()).await.expect("fetch");
        assert_eq!(second, None);

        assert_eq!(client.transport().calls(), 1);
        assert_eq!(ids(&client), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn next_page_failure_is_retried() {
        let transport = ScriptedTransport::default()
            .page(0, &["a", "b"], Some("tok1"))
            .failure(2, FetchError::http(503, "busy"));
        let client = CacheClient::new(SharedCache::default(), transport);
        let fingerprint = query().fingerprint();

        client.fetch_if_needed(&query()).await.expect("first page");
        let err = client.fetch_next(&query()).await.expect_err("next fails");
        assert_eq!(err, CacheError::Fetch(FetchError::http(503, "busy")));
        assert_eq!(ids(&client), vec!["a", "b"]);
        assert!(!client.cache().can_request_next(&fingerprint));

        let err = client.fetch_next(&query()).await.expect_err("blocked");
        assert!(matches!(err, CacheError::NextPageUnavailable { .. }));

        let err = client.retry_next(&query()).await.expect_err("still failing");
        assert!(matches!(err, CacheError::Fetch(_)));
        assert_eq!(client.transport().calls(), 3);
    }

    #[tokio::test]
    async fn failed_first_page_needs_explicit_reload() {
        let transport = ScriptedTransport::default().failure(0, FetchError::http(500, "down"));
        let client = CacheClient::new(SharedCache::default(), transport);

        client.fetch_if_needed(&query()).await.expect_err("first page fails");
        let again = client.fetch_if_needed(&query()).await.expect("no refetch");
        assert_eq!(again, None);
        assert_eq!(client.transport().calls(), 1);

        client.reload(&query()).await.expect_err("still failing");
        assert_eq!(client.transport().calls(), 2);
    }

    #[tokio::test]
    async fn objects_are_fetched_and_merged() {
        let client = CacheClient::new(SharedCache::default(), ScriptedTransport::default());

        let record = client
            .fetch_object(&RecordId::from("e1"))
            .await
            .expect("fetch")
            .expect("record");
        assert_eq!(record.field("fetched"), Some(&serde_json::json!(true)));

        let err = client
            .fetch_object(&RecordId::from("missing"))
            .await
            .expect_err("not found");
        assert!(matches!(err, CacheError::Fetch(ref fetch) if fetch.is_not_found()));
        assert!(
            client
                .cache()
                .read(|cache| cache.object(&RecordId::from("missing")).is_error())
        );
    }

    #[tokio::test]
    async fn fetch_objects_skips_known_records() {
        let transport = ScriptedTransport::default().page(0, &["a", "b"], None);
        let client = CacheClient::new(SharedCache::default(), transport);
        client.fetch_if_needed(&query()).await.expect("page");

        let wanted = ["a", "b", "c", "missing"].map(RecordId::from);
        let loaded = client.fetch_objects(&wanted).await;
        assert_eq!(loaded, 1);
        assert!(client.cache().record(&RecordId::from("c")).is_some());
    }
}
