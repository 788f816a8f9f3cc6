//! Shared domain types: identifiers, coordinates and the records each data
//! source contributes.
//!
//! The serde shapes follow the map backend's JSON payloads, so the same types
//! are used on the wire and inside the index.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Knowledge-base item identifier (`Q42`), the cross-reference key shared by
/// both data sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Geographic object identifier (`node/1`, `way/5`, `relation/7`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoId(String);

impl GeoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object kind prefix (`node`, `way`, `relation`), if present.
    pub fn kind(&self) -> Option<&str> {
        self.0.split_once('/').map(|(kind, _)| kind)
    }
}

impl fmt::Display for GeoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeoId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Knowledge-base type identifier (the target of an "instance of" claim).
pub type TypeId = EntityId;

// ============================================================================
// Coordinates
// ============================================================================

/// A point, serialized as `[lat, lon]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<[f64; 2]> for LatLon {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

impl From<LatLon> for [f64; 2] {
    fn from(p: LatLon) -> Self {
        [p.lat, p.lon]
    }
}

/// Viewport bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn center(&self) -> LatLon {
        LatLon::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    pub fn contains(&self, p: LatLon) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lon >= self.west && p.lon <= self.east
    }

    /// `west,south,east,north`, the query-string encoding the backend reads.
    pub fn to_bbox_string(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    /// Parse the `west,south,east,north` encoding.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            &[west, south, east, north] if west <= east && south <= north => {
                Some(Self::new(west, south, east, north))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Source records
// ============================================================================

/// What the knowledge base knows about an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    #[serde(rename = "qid")]
    pub id: EntityId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered "instance of" types.
    #[serde(rename = "isa_list", default)]
    pub type_list: Vec<TypeId>,
    #[serde(rename = "markers", default)]
    pub coords: Vec<LatLon>,
    #[serde(rename = "image_list", default)]
    pub images: Vec<String>,
    #[serde(rename = "street_address", default)]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl KnowledgeRecord {
    pub fn new(id: impl Into<EntityId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            type_list: Vec::new(),
            coords: Vec::new(),
            images: Vec::new(),
            addresses: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Add a type, keeping the list free of duplicates.
    pub fn with_type(mut self, type_id: impl Into<TypeId>) -> Self {
        let type_id = type_id.into();
        if !self.type_list.contains(&type_id) {
            self.type_list.push(type_id);
        }
        self
    }

    pub fn with_coord(mut self, lat: f64, lon: f64) -> Self {
        self.coords.push(LatLon::new(lat, lon));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Drop repeated type ids, keeping first occurrence order.
    pub(crate) fn dedup_types(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.type_list.retain(|t| seen.insert(t.clone()));
    }
}

/// A geographic object carrying a cross-reference to a knowledge-base item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub identifier: GeoId,
    #[serde(rename = "wikidata", default)]
    pub entity_id: Option<EntityId>,
    #[serde(default)]
    pub name: Option<String>,
    pub centroid: LatLon,
    #[serde(rename = "geojson", default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl GeoRecord {
    pub fn new(identifier: impl Into<GeoId>, entity_id: impl Into<EntityId>, centroid: LatLon) -> Self {
        Self {
            identifier: identifier.into(),
            entity_id: Some(entity_id.into()),
            name: None,
            centroid,
            geometry: None,
            url: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Per-type count as reported by the backend alongside a knowledge page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeFacetCount {
    #[serde(rename = "qid")]
    pub type_id: TypeId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub count: u64,
}

impl TypeFacetCount {
    pub fn new(type_id: impl Into<TypeId>, label: impl Into<String>, count: u64) -> Self {
        Self {
            type_id: type_id.into(),
            label: label.into(),
            count,
        }
    }
}

// ============================================================================
// Detail lookups
// ============================================================================

/// An editor preset that describes a candidate (`Tag:amenity=pub`, "Pub").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub tag_or_key: String,
    #[serde(default)]
    pub name: String,
}

impl Preset {
    pub fn new(tag_or_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tag_or_key: tag_or_key.into(),
            name: name.into(),
        }
    }

    /// Whether an entry of the focused item's tag/key list selects this
    /// preset. `Key:k` covers every `Tag:k=v`.
    pub fn is_matched_by(&self, tag_or_key: &str) -> bool {
        if self.tag_or_key == tag_or_key {
            return true;
        }
        match (
            tag_or_key.strip_prefix("Key:"),
            self.tag_or_key.strip_prefix("Tag:"),
        ) {
            (Some(key), Some(tag)) => tag.split_once('=').map(|(k, _)| k) == Some(key),
            _ => false,
        }
    }
}

/// A nearby geographic object offered as a possible match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub identifier: GeoId,
    #[serde(rename = "distance")]
    pub distance_meters: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub presets: Vec<Preset>,
    /// Presets selected by the focused item's tag/key list; filled in by the
    /// detail session.
    #[serde(default)]
    pub matched_presets: Vec<Preset>,
    #[serde(default)]
    pub address_list: Vec<String>,
}

impl Candidate {
    pub fn new(identifier: impl Into<GeoId>, distance_meters: f64) -> Self {
        Self {
            identifier: identifier.into(),
            distance_meters,
            name: None,
            presets: Vec::new(),
            matched_presets: Vec::new(),
            address_list: Vec::new(),
        }
    }

    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.presets.push(preset);
        self
    }
}

/// Tag/key list for one item, as returned by the tags lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTags {
    #[serde(rename = "qid")]
    pub id: EntityId,
    #[serde(rename = "tag_or_key_list", default)]
    pub tags: Vec<String>,
}

/// Nearby candidates for one item, as returned by the candidates lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateList {
    #[serde(rename = "qid")]
    pub id: EntityId,
    #[serde(rename = "nearby", default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
}

/// Free-text search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub lon: f64,
}

impl SearchHit {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// Accept `51.5` as well as `"51.5"`; geocoder payloads use strings.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
