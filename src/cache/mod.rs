//! Folio result cache
//!
//! Keeps paginated query results and the records they reference in two
//! normalized layers:
//!
//! - **Result windows**: ordered record ids per query [`Fingerprint`], with
//!   cursor, total, facets and load status
//! - **Object store**: one entry per [`RecordId`](crate::domain::RecordId),
//!   shared by every window that lists it
//!
//! All mutations are [`EventKind`]s applied by [`CacheController`]; the
//! async [`CacheClient`] drives them from a [`Transport`](crate::application::transport::Transport).
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! default_page_limit = 20
//! history_limit = 1024
//! prune_on_delete = false
//! ```

mod client;
mod config;
mod controller;
mod error;
mod events;
mod keys;
mod lock;
mod merge;
mod selectors;
mod state;
mod store;
mod window;

pub use client::{CacheClient, SharedCache};
pub(crate) use client::METRIC_FETCH_MS;
pub use config::CacheConfig;
pub(crate) use config::{DEFAULT_HISTORY_LIMIT, DEFAULT_PAGE_LIMIT};
pub use controller::{CacheController, PageTicket};
pub(crate) use controller::{
    METRIC_FETCH_ERROR_TOTAL, METRIC_OBJECTS, METRIC_PAGE_DROPPED_TOTAL, METRIC_PAGE_MERGE_TOTAL,
    METRIC_WINDOWS,
};
pub use error::CacheError;
pub use events::{CacheEvent, Epoch, EventKind, EventLog};
pub use keys::Fingerprint;
pub use merge::{IncomingPage, MergeOutcome, expected_offset, merge_page};
pub use selectors::{
    Denormalized, ListState, ResultView, Viewer, denormalize, facet_values, list_state,
    schema_counts, select_result, viewer_for,
};
pub use state::{CacheState, Transition};
pub use store::{ObjectEntry, ObjectStatus, ObjectStore};
pub use window::{Generation, ResultWindow, WindowStatus};
