//! Map data model
//!
//! Event records as the backend stores them, the fixed category table, the
//! derived marker set and the map viewport.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Backend-assigned document key. Never minted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// One entry of the category picker and legend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryOption {
    pub value: &'static str,
    #[serde(rename = "markerColor")]
    pub marker_color: &'static str,
}

/// The fixed category table, in picker order
pub const CATEGORY_OPTIONS: [CategoryOption; 4] = [
    CategoryOption {
        value: "Área alagada",
        marker_color: "orange",
    },
    CategoryOption {
        value: "Buraco",
        marker_color: "red",
    },
    CategoryOption {
        value: "Chuvas fortes",
        marker_color: "blue",
    },
    CategoryOption {
        value: "Deslizamento",
        marker_color: "green",
    },
];

static OPTIONS_BY_LABEL: Lazy<HashMap<&'static str, &'static CategoryOption>> =
    Lazy::new(|| CATEGORY_OPTIONS.iter().map(|o| (o.value, o)).collect());

/// Look up a category by its label (case-sensitive, as stored)
pub fn category_by_label(label: &str) -> Option<&'static CategoryOption> {
    OPTIONS_BY_LABEL.get(label).copied()
}

/// Look up a category by its position in the picker
pub fn category_at(index: usize) -> Option<&'static CategoryOption> {
    CATEGORY_OPTIONS.get(index)
}

/// Fields stored in an event document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFields {
    /// Category label
    pub value: String,
    pub marker_color: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl EventFields {
    /// Spread a chosen category and a map coordinate into one document
    pub fn new(option: &CategoryOption, at: Coordinate) -> Self {
        Self {
            value: option.value.to_string(),
            marker_color: option.marker_color.to_string(),
            latitude: at.latitude,
            longitude: at.longitude,
        }
    }

    /// Document body as sent to the store
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("value".to_string(), json!(self.value));
        doc.insert("markerColor".to_string(), json!(self.marker_color));
        doc.insert("latitude".to_string(), json!(self.latitude));
        doc.insert("longitude".to_string(), json!(self.longitude));
        doc
    }

    pub fn from_document(doc: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(doc.clone()))
    }
}

/// A reported hazard: backend identity plus its stored fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: EventId,
    #[serde(flatten)]
    pub fields: EventFields,
}

impl EventRecord {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.fields.latitude, self.fields.longitude)
    }

    /// Category from the fixed table, if the stored label is one we know
    pub fn category(&self) -> Option<&'static CategoryOption> {
        category_by_label(&self.fields.value)
    }
}

/// Ordered, render-ready set of records. Always rebuilt whole from a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MarkerSet {
    records: Vec<EventRecord>,
}

impl MarkerSet {
    /// Build from records in backend order; later duplicates of an identity are dropped
    pub fn from_records(records: impl IntoIterator<Item = EventRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: &EventId) -> Option<&EventRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.get(id).is_some()
    }

    pub fn as_slice(&self) -> &[EventRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a MarkerSet {
    type Item = &'a EventRecord;
    type IntoIter = std::slice::Iter<'a, EventRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Map viewport: center plus zoom spans
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            latitude: 37.78825,
            longitude: -122.4324,
            latitude_delta: 0.015,
            longitude_delta: 0.0121,
        }
    }
}

impl Region {
    /// Same zoom, new center
    pub fn centered_on(self, at: Coordinate) -> Self {
        Self {
            latitude: at.latitude,
            longitude: at.longitude,
            ..self
        }
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, option: &CategoryOption) -> EventRecord {
        EventRecord {
            id: EventId::new(id),
            fields: EventFields::new(option, Coordinate::new(-23.5, -46.6)),
        }
    }

    #[test]
    fn test_category_lookup() {
        assert_eq!(category_by_label("Buraco").map(|o| o.marker_color), Some("red"));
        assert_eq!(category_by_label("buraco"), None);
        assert_eq!(category_at(3).map(|o| o.value), Some("Deslizamento"));
        assert!(category_at(4).is_none());
    }

    #[test]
    fn test_document_shape() {
        let fields = EventFields::new(&CATEGORY_OPTIONS[0], Coordinate::new(1.5, 2.5));
        let doc = fields.to_document();

        assert_eq!(doc["value"], json!("Área alagada"));
        assert_eq!(doc["markerColor"], json!("orange"));
        assert_eq!(doc["latitude"], json!(1.5));
        assert_eq!(EventFields::from_document(&doc).unwrap(), fields);
    }

    #[test]
    fn test_marker_set_dedups_by_identity() {
        let set = MarkerSet::from_records(vec![
            record("a", &CATEGORY_OPTIONS[0]),
            record("b", &CATEGORY_OPTIONS[1]),
            record("a", &CATEGORY_OPTIONS[2]),
        ]);

        assert_eq!(set.len(), 2);
        let ids: Vec<&str> = set.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        // First occurrence wins
        assert_eq!(set.get(&EventId::new("a")).unwrap().fields.marker_color, "orange");
    }

    #[test]
    fn test_region_recenter_keeps_zoom() {
        let region = Region::default().centered_on(Coordinate::new(-23.5, -46.6));
        assert_eq!(region.latitude, -23.5);
        assert_eq!(region.longitude, -46.6);
        assert_eq!(region.latitude_delta, 0.015);
        assert_eq!(region.longitude_delta, 0.0121);
    }
}
