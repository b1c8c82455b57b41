//! The `_metadata.json` summary kept next to the collection files.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::types::CollectionName;

/// file name of the metadata unit
pub const METADATA_FILE: &str = "_metadata.json";

/// per-collection summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    pub count: usize,
    pub last_modified: DateTime<Utc>,
}

/// dataset summary: per-collection counts plus a derived total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub collections: BTreeMap<CollectionName, CollectionMetadata>,
    pub total_records: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Rebuild from the actual size of every collection on disk.
    ///
    /// `changed` is stamped with `at`; other collections keep the timestamp
    /// `previous` had for them, and ones it never saw get `at`.
    pub fn rebuild(
        previous: &Metadata,
        counts: impl IntoIterator<Item = (CollectionName, usize)>,
        changed: &CollectionName,
        at: DateTime<Utc>,
    ) -> Self {
        let collections = counts
            .into_iter()
            .map(|(name, count)| {
                let last_modified = match previous.collections.get(&name) {
                    Some(prev) if &name != changed => prev.last_modified,
                    _ => at,
                };
                (name, CollectionMetadata { count, last_modified })
            })
            .collect();

        let mut metadata = Self {
            collections,
            total_records: 0,
            last_modified: Some(at),
        };
        metadata.recompute_total();
        metadata
    }

    pub fn recompute_total(&mut self) {
        self.total_records = self.collections.values().map(|c| c.count).sum();
    }

    /// record count of one collection (0 if never written)
    pub fn count(&self, collection: &CollectionName) -> usize {
        self.collections.get(collection).map_or(0, |c| c.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_counts_every_collection() {
        let users = CollectionName::new("users").unwrap();
        let orders = CollectionName::new("orders").unwrap();
        let now = Utc::now();

        let meta = Metadata::rebuild(
            &Metadata::default(),
            [(users.clone(), 2), (orders.clone(), 3)],
            &orders,
            now,
        );
        assert_eq!(meta.total_records, 5);
        assert_eq!(meta.count(&users), 2);
        assert_eq!(meta.last_modified, Some(now));
    }

    #[test]
    fn test_rebuild_keeps_untouched_timestamps() {
        let users = CollectionName::new("users").unwrap();
        let orders = CollectionName::new("orders").unwrap();
        let earlier = Utc::now() - chrono::Duration::hours(1);
        let now = Utc::now();

        let first = Metadata::rebuild(&Metadata::default(), [(users.clone(), 1)], &users, earlier);
        let second = Metadata::rebuild(&first, [(users.clone(), 1), (orders.clone(), 4)], &orders, now);

        assert_eq!(second.collections[&users].last_modified, earlier);
        assert_eq!(second.collections[&orders].last_modified, now);
        assert_eq!(second.total_records, 5);

        // a collection whose file is gone drops out
        let third = Metadata::rebuild(&second, [(orders.clone(), 4)], &orders, now);
        assert_eq!(third.count(&users), 0);
        assert_eq!(third.total_records, 4);
    }

    #[test]
    fn test_json_layout() {
        let users = CollectionName::new("users").unwrap();
        let meta = Metadata::rebuild(&Metadata::default(), [(users.clone(), 1)], &users, Utc::now());
        let value = serde_json::to_value(&meta).unwrap();

        assert_eq!(value["totalRecords"], 1);
        assert_eq!(value["collections"]["users"]["count"], 1);
        assert!(value["collections"]["users"].get("lastModified").is_some());
    }
}
