use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::resource::ResourceRecord;

pub const KEY_SEPARATOR: char = '.';

/// Lookup key for a resource: `resource_type.identifier`.
pub fn resource_key(resource_type: &str, identifier: &str) -> String {
    format!("{resource_type}{KEY_SEPARATOR}{identifier}")
}

/// Which identity convention a collection is keyed by.
///
/// Discovered documents are keyed by resource name, target documents by
/// cloud id. The asymmetry is what lets the same cloud object be matched
/// across two documents that named it differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Target,
    Discovered,
}

impl Origin {
    pub fn identifier<'a>(&self, record: &'a ResourceRecord) -> &'a str {
        match self {
            Origin::Target => &record.id,
            Origin::Discovered => &record.resource_name,
        }
    }

    pub fn key_for(&self, record: &ResourceRecord) -> String {
        resource_key(&record.resource_type, self.identifier(record))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Target => f.write_str("target"),
            Origin::Discovered => f.write_str("discovered"),
        }
    }
}

/// Records keyed by one [`Origin`] convention, kept in first-insertion order.
///
/// Re-inserting an existing key replaces the record in place, so the last
/// instance of a multi-instance block wins without moving position.
#[derive(Debug, Clone)]
pub struct ResourceCollection {
    origin: Origin,
    records: Vec<ResourceRecord>,
    index: HashMap<String, usize>,
}

impl ResourceCollection {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_records(origin: Origin, records: impl IntoIterator<Item = ResourceRecord>) -> Self {
        let mut collection = Self::new(origin);
        for record in records {
            collection.insert(record);
        }
        collection
    }

    /// Insert under this collection's convention; returns the key used.
    pub fn insert(&mut self, record: ResourceRecord) -> String {
        let key = self.origin.key_for(&record);
        match self.index.get(&key) {
            Some(&position) => self.records[position] = record,
            None => {
                self.index.insert(key.clone(), self.records.len());
                self.records.push(record);
            }
        }
        key
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn get(&self, key: &str) -> Option<&ResourceRecord> {
        self.index.get(key).map(|&position| &self.records[position])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn record(resource_type: &str, name: &str, id: &str) -> ResourceRecord {
        ResourceRecord {
            id: id.to_string(),
            resource_type: resource_type.to_string(),
            resource_name: name.to_string(),
            attributes: BTreeMap::new(),
            depends_on: vec![],
            resource_index: 0,
        }
    }

    #[test]
    fn test_resource_key_format() {
        assert_eq!(resource_key("ibm_is_vpc", "abc123"), "ibm_is_vpc.abc123");
    }

    #[test]
    fn test_target_uses_id_discovered_uses_name() {
        let r = record("vm", "web1", "abc123");
        assert_eq!(Origin::Target.key_for(&r), "vm.abc123");
        assert_eq!(Origin::Discovered.key_for(&r), "vm.web1");
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut collection = ResourceCollection::new(Origin::Discovered);
        collection.insert(record("vm", "a", "1"));
        collection.insert(record("vm", "b", "2"));
        collection.insert(record("vm", "a", "3"));

        assert_eq!(collection.len(), 2);
        let ids: Vec<&str> = collection.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(collection.get("vm.a").unwrap().id, "3");
    }

    #[test]
    fn test_lookup_misses() {
        let collection =
            ResourceCollection::from_records(Origin::Target, vec![record("vm", "web1", "abc123")]);
        assert!(collection.contains_key("vm.abc123"));
        assert!(!collection.contains_key("vm.web1"));
        assert!(collection.get("db.abc123").is_none());
        assert!(!collection.is_empty());
    }

    proptest! {
        #[test]
        fn test_keys_never_swap_between_conventions(
            resource_type in "[a-z][a-z_]{0,12}",
            name in "[a-z][a-z0-9_]{0,12}",
            id in "[a-f0-9]{1,16}",
        ) {
            let r = record(&resource_type, &name, &id);
            let target = ResourceCollection::from_records(Origin::Target, vec![r.clone()]);
            let discovered = ResourceCollection::from_records(Origin::Discovered, vec![r.clone()]);

            prop_assert!(target.contains_key(&resource_key(&resource_type, &id)));
            prop_assert!(discovered.contains_key(&resource_key(&resource_type, &name)));
            if name != id {
                prop_assert!(!target.contains_key(&resource_key(&resource_type, &name)));
                prop_assert!(!discovered.contains_key(&resource_key(&resource_type, &id)));
            }
        }
    }
}
