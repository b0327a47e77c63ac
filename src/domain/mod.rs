//! Domain layer types: queries and the failures a fetch can report.

pub mod error;
pub mod query;

pub use folio_types::{
    FacetResult, FacetValue, PageRequest, PageResponse, Record, RecordId, RecordKind,
};
