//! Camera bookmarks and points of interest
//!
//! Both catalogs are plain JSON arrays served next to the scene. Parsing is
//! forgiving: a document that is not an array yields nothing, and a single
//! malformed entry is skipped instead of discarding the whole list.

use glam::Vec3;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("JSON parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Expected a JSON array of {0}")]
    NotAnArray(&'static str),
}

/// A named, author-defined camera viewpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraBookmark {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Point the camera looks at
    pub position: Vec3,
    /// Direction from the eye towards `position`; defaults to -Z
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_direction: Option<Vec3>,
    #[serde(default)]
    pub is_initial: bool,
}

impl CameraBookmark {
    /// Synthetic bookmark that frames a POI with the default direction.
    pub fn looking_at_poi(poi: &Poi) -> Self {
        Self {
            id: format!("poi:{}", poi.id),
            name: poi.name.clone(),
            description: None,
            position: poi.position,
            camera_direction: None,
            is_initial: false,
        }
    }
}

/// A labeled 3D location rendered as a clickable marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
}

/// Something that went wrong with one entry of a catalog
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogIssue {
    MalformedEntry {
        kind: &'static str,
        index: usize,
        reason: String,
    },
    DuplicateId {
        kind: &'static str,
        id: String,
    },
    ExtraInitial {
        id: String,
    },
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogIssue::MalformedEntry { kind, index, reason } => {
                write!(f, "{} entry #{} skipped: {}", kind, index, reason)
            }
            CatalogIssue::DuplicateId { kind, id } => {
                write!(f, "{} id '{}' appears more than once, keeping the first", kind, id)
            }
            CatalogIssue::ExtraInitial { id } => {
                write!(f, "bookmark '{}' is also marked initial, ignoring the flag", id)
            }
        }
    }
}

/// Entries that survived parsing plus what was dropped along the way
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub issues: Vec<CatalogIssue>,
}

/// Entries that carry an identity.
pub trait CatalogEntry: DeserializeOwned {
    const KIND: &'static str;
    fn id(&self) -> &str;
}

impl CatalogEntry for CameraBookmark {
    const KIND: &'static str = "camera";
    fn id(&self) -> &str {
        &self.id
    }
}

impl CatalogEntry for Poi {
    const KIND: &'static str = "poi";
    fn id(&self) -> &str {
        &self.id
    }
}

/// Parse a catalog document strictly at the top level.
///
/// Fails when the document is not JSON or not an array. Inside the array,
/// malformed entries and repeated ids are dropped and reported.
pub fn parse_catalog<T: CatalogEntry>(body: &str) -> Result<Parsed<T>, CatalogError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let serde_json::Value::Array(entries) = value else {
        return Err(CatalogError::NotAnArray(T::KIND));
    };

    let mut items: Vec<T> = Vec::with_capacity(entries.len());
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<T>(entry) {
            Ok(item) => {
                if seen.insert(item.id().to_string()) {
                    items.push(item);
                } else {
                    issues.push(CatalogIssue::DuplicateId {
                        kind: T::KIND,
                        id: item.id().to_string(),
                    });
                }
            }
            Err(e) => issues.push(CatalogIssue::MalformedEntry {
                kind: T::KIND,
                index,
                reason: e.to_string(),
            }),
        }
    }

    Ok(Parsed { items, issues })
}

/// Parse bookmarks, also enforcing a single initial bookmark.
pub fn parse_bookmarks(body: &str) -> Result<Parsed<CameraBookmark>, CatalogError> {
    let mut parsed = parse_catalog::<CameraBookmark>(body)?;
    let mut has_initial = false;
    for bookmark in parsed.items.iter_mut().filter(|b| b.is_initial) {
        if has_initial {
            bookmark.is_initial = false;
            parsed.issues.push(CatalogIssue::ExtraInitial {
                id: bookmark.id.clone(),
            });
        }
        has_initial = true;
    }
    Ok(parsed)
}

pub fn parse_pois(body: &str) -> Result<Parsed<Poi>, CatalogError> {
    parse_catalog::<Poi>(body)
}

/// Turn a fetch result into a list, degrading every failure to empty.
pub fn list_or_empty<T, E: fmt::Display>(
    source: &str,
    fetched: Result<String, E>,
    parse: fn(&str) -> Result<Parsed<T>, CatalogError>,
) -> Vec<T> {
    let body = match fetched {
        Ok(body) => body,
        Err(e) => {
            warn!(source, error = %e, "Catalog fetch failed, using an empty list");
            return Vec::new();
        }
    };
    match parse(&body) {
        Ok(parsed) => {
            for issue in &parsed.issues {
                warn!(source, "{}", issue);
            }
            parsed.items
        }
        Err(e) => {
            warn!(source, error = %e, "Catalog unusable, using an empty list");
            Vec::new()
        }
    }
}

/// The bookmark to apply on startup, if any.
pub fn initial_bookmark(bookmarks: &[CameraBookmark]) -> Option<&CameraBookmark> {
    bookmarks.iter().find(|b| b.is_initial)
}

/// Ids are strings but hand-written catalogs often use numbers.
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(s) if !s.is_empty() => Ok(s),
        RawId::Text(_) => Err(de::Error::custom("id must not be empty")),
        RawId::Number(n) => Ok(n.to_string()),
    }
}
