//! Record, page and summary types shared across the pipeline

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// One submission as returned by the collection API: field path -> value.
///
/// Field paths may be group-prefixed (`bloc_a/a1_service_top1`) or flat.
pub type RawRecord = Map<String, Value>;

/// One page of the paginated data endpoint.
///
/// `results` is required: a JSON body without it is not a data page, even when
/// the status is 200. `previous` is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<RawRecord>,
}

/// Label -> count, positive counts only, ordered by count desc then label asc (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateCount {
    entries: Vec<(String, u64)>,
}

impl AggregateCount {
    pub fn from_tally(tally: HashMap<String, u64>) -> Self {
        let mut entries: Vec<(String, u64)> = tally
            .into_iter()
            .filter(|(label, count)| *count > 0 && !label.is_empty())
            .collect();
        entries.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
                .then_with(|| a.0.cmp(&b.0))
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }

    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AggregateCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

/// Aggregates for one scope (all records, or one organisation type)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_responses: usize,
    /// One entry per tracked field, in fixed dashboard order
    pub counts: Vec<(&'static str, AggregateCount)>,
}

impl Summary {
    pub fn get(&self, key: &str) -> Option<&AggregateCount> {
        self.counts.iter().find(|(k, _)| *k == key).map(|(_, c)| c)
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len() + 1))?;
        map.serialize_entry("total_responses", &self.total_responses)?;
        for (key, count) in &self.counts {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

/// Flat display record with the same key set for every submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanRecord {
    pub fields: Vec<(&'static str, String)>,
}

#[cfg(test)]
impl CleanRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(k, _)| *k)
    }
}

impl Serialize for CleanRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// `data.json`: global and per-organisation-type aggregates
#[derive(Debug, Clone, Serialize)]
pub struct AggregateDocument {
    pub generated_at: String,
    pub summary: Summary,
    pub by_org_type: BTreeMap<String, Summary>,
}

/// `records.json`: one clean record per submission
#[derive(Debug, Clone, Serialize)]
pub struct RecordsDocument {
    pub generated_at: String,
    pub records: Vec<CleanRecord>,
}

/// `kobo_raw.json`: every fetched submission, untouched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDump {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
    pub results: Vec<RawRecord>,
}
