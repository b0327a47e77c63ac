//! Transport seam between the cache and whatever serves records.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::error::FetchError;
use crate::domain::query::Query;
use crate::domain::{PageRequest, PageResponse, Record, RecordId};

/// Fetches pages and single records from the server.
///
/// Implementations carry no cache logic: the cache decides what to ask for
/// and when, the transport only answers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_page(
        &self,
        query: &Query,
        page: &PageRequest,
    ) -> Result<PageResponse, FetchError>;

    async fn fetch_record(&self, id: &RecordId) -> Result<Record, FetchError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn fetch_page(
        &self,
        query: &Query,
        page: &PageRequest,
    ) -> Result<PageResponse, FetchError> {
        (**self).fetch_page(query, page).await
    }

    async fn fetch_record(&self, id: &RecordId) -> Result<Record, FetchError> {
        (**self).fetch_record(id).await
    }
}
