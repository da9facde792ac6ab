//! Keyed lookup index over an openFDA device export.
//!
//! The exports are a single JSON object of the form
//! `{"meta": {...}, "results": [ {...}, {...}, ... ]}` and run to hundreds of
//! megabytes. The document is streamed: only the array under the results
//! member is materialised, one record at a time, straight into the index.

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;

/// One device record exactly as it appears in the export.
pub type Record = Map<String, Value>;

pub type RecordIndex = HashMap<String, Record>;

/// Counters collected while loading one export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Items seen in the results array.
    pub records: usize,
    /// Distinct keys in the finished index.
    pub indexed: usize,
    /// Items that were not objects or had no usable key.
    pub skipped: usize,
    /// Items whose key was already present; the later item replaced the earlier.
    pub duplicates: usize,
}

/// Build an index keyed by `key_field` from the array under `results_field`.
///
/// Items whose key is missing, empty, or not a string are skipped. A document
/// without `results_field` yields an empty index.
pub fn build_index<R: Read>(
    reader: R,
    results_field: &str,
    key_field: &str,
) -> Result<(RecordIndex, IndexStats), serde_json::Error> {
    let mut index = RecordIndex::new();
    let mut stats = IndexStats::default();

    let mut de = serde_json::Deserializer::from_reader(reader);
    DocumentSeed {
        results_field,
        key_field,
        index: &mut index,
        stats: &mut stats,
    }
    .deserialize(&mut de)?;
    de.end()?;

    stats.indexed = index.len();
    Ok((index, stats))
}

struct DocumentSeed<'a> {
    results_field: &'a str,
    key_field: &'a str,
    index: &'a mut RecordIndex,
    stats: &'a mut IndexStats,
}

impl<'de, 'a> DeserializeSeed<'de> for DocumentSeed<'a> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for DocumentSeed<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an openFDA export object")
    }

    fn visit_map<A: MapAccess<'de>>(mut self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if key == self.results_field {
                map.next_value_seed(ResultsSeed {
                    key_field: self.key_field,
                    index: &mut *self.index,
                    stats: &mut *self.stats,
                })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct ResultsSeed<'a> {
    key_field: &'a str,
    index: &'a mut RecordIndex,
    stats: &'a mut IndexStats,
}

impl<'de, 'a> DeserializeSeed<'de> for ResultsSeed<'a> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a> Visitor<'de> for ResultsSeed<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of device records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(item) = seq.next_element::<Value>()? {
            self.stats.records += 1;
            let Value::Object(record) = item else {
                self.stats.skipped += 1;
                continue;
            };
            let key = record
                .get(self.key_field)
                .and_then(Value::as_str)
                .filter(|k| !k.is_empty())
                .map(str::to_string);
            match key {
                Some(key) => {
                    if self.index.insert(key, record).is_some() {
                        self.stats.duplicates += 1;
                    }
                }
                None => self.stats.skipped += 1,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(json: &str) -> (RecordIndex, IndexStats) {
        build_index(json.as_bytes(), "results", "k_number").unwrap()
    }

    #[test]
    fn test_indexes_records_by_key() {
        let (index, stats) = load(
            r#"{"meta": {"results": {"total": 2}},
                "results": [
                  {"k_number": "K240369", "city": "BOSTON"},
                  {"k_number": "K191234", "city": "AUSTIN"}
                ]}"#,
        );
        assert_eq!(index.len(), 2);
        assert_eq!(index["K240369"]["city"], "BOSTON");
        assert_eq!(
            stats,
            IndexStats { records: 2, indexed: 2, skipped: 0, duplicates: 0 }
        );
    }

    #[test]
    fn test_later_duplicate_replaces_earlier() {
        let (index, stats) = load(
            r#"{"results": [
                  {"k_number": "K1", "state": "MA"},
                  {"k_number": "K1", "state": "TX"}
                ]}"#,
        );
        assert_eq!(index["K1"]["state"], "TX");
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.indexed, 1);
    }

    #[test]
    fn test_skips_items_without_usable_key() {
        let (index, stats) = load(
            r#"{"results": [
                  {"city": "NOKEY"},
                  {"k_number": "", "city": "EMPTY"},
                  {"k_number": 12, "city": "NUMERIC"},
                  "not an object",
                  {"k_number": "K2"}
                ]}"#,
        );
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("K2"));
        assert_eq!(stats.records, 5);
        assert_eq!(stats.skipped, 4);
    }

    #[test]
    fn test_missing_results_member_is_empty() {
        let (index, stats) = load(r#"{"meta": {"disclaimer": "x"}}"#);
        assert!(index.is_empty());
        assert_eq!(stats.records, 0);
    }

    #[test]
    fn test_results_after_other_members() {
        let (index, _) = build_index(
            r#"{"results": [{"pma_number": "P200001"}], "meta": [1, 2, {"a": null}]}"#.as_bytes(),
            "results",
            "pma_number",
        )
        .unwrap();
        assert!(index.contains_key("P200001"));
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(build_index(r#"{"results": [{"k_number": "K1"}"#.as_bytes(), "results", "k_number").is_err());
        assert!(build_index(r#"{"results": []} trailing"#.as_bytes(), "results", "k_number").is_err());
        assert!(build_index(r#"[1, 2]"#.as_bytes(), "results", "k_number").is_err());
    }
}
