//! Cache key definitions.
//!
//! Defines `Fingerprint`, the canonical key of a result window.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use crate::domain::query::Query;

const DIGEST_HEX_LEN: usize = 16;

/// Canonical, construction-order independent key of a [`Query`].
///
/// Layout: `<resource>?<pairs>[#<namespace>]` where every component is
/// percent-encoded, so the structural characters `?`, `&`, `=` and `#` can
/// only appear as delimiters. Sort keys always end in `:asc` or `:desc`, so
/// a field name containing `:` cannot pass for a direction. Equal
/// fingerprints therefore imply equal semantic queries and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(query: &Query) -> Self {
        let mut key: String = form_urlencoded::byte_serialize(query.resource().as_bytes()).collect();
        key.push('?');

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in query.canonical_pairs() {
            serializer.append_pair(&name, &value);
        }
        key.push_str(&serializer.finish());

        if let Some(namespace) = query.namespace_key() {
            key.push('#');
            key.extend(form_urlencoded::byte_serialize(namespace.as_bytes()));
        }
        Self(key)
    }

    /// Wrap an already canonical key, e.g. one read back from an event log.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short hex digest for log lines.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let mut hex = hex::encode(hasher.finalize());
        hex.truncate(DIGEST_HEX_LEN);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Query> for Fingerprint {
    fn from(query: &Query) -> Self {
        Self::of(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::SortDirection;

    #[test]
    fn construction_order_does_not_matter() {
        let first = Query::new("search")
            .filter("schema", "Person")
            .filter("countries", "de")
            .filter("countries", "fr")
            .facet("countries", Some(30))
            .facet("schema", None)
            .text("ports");
        let second = Query::new("search")
            .text("ports")
            .facet("schema", None)
            .filter("countries", "fr")
            .facet("countries", Some(30))
            .filter("schema", "Person")
            .filter("countries", "de");

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn every_semantic_parameter_changes_the_key() {
        let base = Query::new("search").text("ports").filter("schema", "Person");
        let variants = [
            base.clone().text("harbours"),
            base.clone().filter("schema", "Company"),
            base.clone().facet("schema", None),
            base.clone().facet("schema", Some(5)),
            base.clone().sort_by("name", SortDirection::Asc),
            base.clone().sort_by("name", SortDirection::Desc),
            base.clone().namespace("references"),
            base.clone().param("prefix", "a"),
        ];

        let base_key = base.fingerprint();
        for (index, variant) in variants.iter().enumerate() {
            assert_ne!(variant.fingerprint(), base_key, "variant {index}");
            for other in &variants[index + 1..] {
                assert_ne!(variant.fingerprint(), other.fingerprint());
            }
        }
    }

    #[test]
    fn page_limit_is_not_part_of_the_key() {
        let query = Query::new("collections").filter("kind", "source");
        assert_eq!(
            query.clone().limit(20).fingerprint(),
            query.limit(40).fingerprint()
        );
    }

    #[test]
    fn sort_order_across_fields_is_semantic() {
        let a = Query::new("search")
            .sort_by("name", SortDirection::Asc)
            .sort_by("created_at", SortDirection::Asc);
        let b = Query::new("search")
            .sort_by("created_at", SortDirection::Asc)
            .sort_by("name", SortDirection::Asc);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn delimiters_inside_values_cannot_collide() {
        let crafted = Query::new("search").filter("a", "1&filter:b=2");
        let genuine = Query::new("search").filter("a", "1").filter("b", "2");
        assert_ne!(crafted.fingerprint(), genuine.fingerprint());

        let descending = Query::new("search").sort_by("name", SortDirection::Desc);
        let colon_field = Query::new("search").sort_by("name:desc", SortDirection::Asc);
        assert_ne!(descending.fingerprint(), colon_field.fingerprint());

        let hashed = Query::new("search").namespace("x#y");
        let split = Query::new("search#x").namespace("y");
        assert_ne!(hashed.fingerprint(), split.fingerprint());
    }

    #[test]
    fn canonical_layout() {
        let query = Query::new("collections")
            .sort_by("count", SortDirection::Desc)
            .facet("category", Some(20))
            .filter("kind", "source")
            .namespace("sources");
        insta::assert_snapshot!(
            query.fingerprint().as_str(),
            @"collections?filter%3Akind=source&facet=category&facet_size%3Acategory=20&sort=count%3Adesc#sources"
        );
    }

    #[test]
    fn digest_is_stable_and_short() {
        let key = Query::new("search").text("ports").fingerprint();
        assert_eq!(key.digest(), key.clone().digest());
        assert_eq!(key.digest().len(), DIGEST_HEX_LEN);
    }
}
