//! Wire and domain types for digital twin resolution.
//!
//! The directory service has shipped two envelope shapes for the
//! associations endpoint over its lifetime; both are accepted here and
//! normalized to a single internal record at the parse boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static metadata linked to a device signature by the directory service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Associations {
    /// Pointer to the device's story document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Free-text labels (e.g. "chair", "desk")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// 2D/3D coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec<f64>>,
    /// Colon-separated hierarchical path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Associations {
    /// Whether the tags include the given label.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }
}

/// Associations endpoint response, either envelope generation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AssociationsEnvelope {
    /// Directory v1.x response shape
    Current {
        associations: HashMap<String, Associations>,
    },
    /// Directory v0.x response shape
    Legacy {
        devices: HashMap<String, Associations>,
    },
}

impl AssociationsEnvelope {
    /// Normalize to the single inner record and its canonical signature.
    pub(crate) fn into_entry(self) -> Option<(String, Associations)> {
        let map = match self {
            AssociationsEnvelope::Current { associations } => associations,
            AssociationsEnvelope::Legacy { devices } => devices,
        };
        map.into_iter().next()
    }
}

/// A structured document describing a real-world entity, addressed by URL.
///
/// Stories are typically JSON-LD but the schema is open; the raw document
/// is retained and the common fields are exposed through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Story(serde_json::Value);

impl Story {
    /// Parse a JSON document as a story.
    ///
    /// A `{"stories": {<id>: {...}}}` envelope unwraps to the single inner
    /// story; any other document is taken as the story itself.
    pub fn parse(document: serde_json::Value) -> Option<Story> {
        if let Some(stories) = document.get("stories").and_then(|s| s.as_object()) {
            return stories.values().next().cloned().map(Story);
        }
        if document.is_null() {
            return None;
        }
        Some(Story(document))
    }

    /// The raw story document.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Determine the story's display title, if any.
    pub fn title(&self) -> Option<&str> {
        named_property(&self.0, &["schema:name", "name", "title"])
    }

    /// Determine the story's image URL, if any.
    pub fn image_url(&self) -> Option<&str> {
        named_property(&self.0, &["schema:image", "image"])
    }
}

/// Look up the first of the given keys on the document, falling back to the
/// first thing in a JSON-LD `@graph`.
fn named_property<'a>(document: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    for key in keys {
        if let Some(value) = document.get(key).and_then(|v| v.as_str()) {
            return Some(value);
        }
    }
    let thing = document.get("@graph")?.as_array()?.first()?;
    for key in keys {
        if let Some(value) = thing.get(key).and_then(|v| v.as_str()) {
            return Some(value);
        }
    }
    None
}

/// Extract an embedded JSON-LD story from an HTML page.
///
/// Scans for a `<script type="application/ld+json">` block and parses its
/// contents; tolerant of attribute whitespace since the pages being
/// scraped are not under our control.
pub fn extract_story_from_html(html: &str) -> Option<Story> {
    let tag_index = html.find("application/ld+json")?;
    let start = tag_index + html[tag_index..].find('>')? + 1;
    let stop = start + html[start..].find("</script>")?;

    let document: serde_json::Value = serde_json::from_str(html[start..stop].trim()).ok()?;
    Story::parse(document)
}

/// Where a resolved story came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorySource {
    /// Served from the in-memory cache
    Cache,
    /// Fetched over the network on this call
    Network,
}

/// Options for story resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoryOptions {
    /// Bypass the cache and refetch even when a story is already cached
    pub force_refetch: bool,
}

/// Options for digital twin resolution.
#[derive(Debug, Clone, Copy)]
pub struct TwinOptions {
    /// Resolve the story when the associations carry a URL
    pub fetch_story: bool,
    /// Bypass the story cache
    pub force_refetch: bool,
}

impl Default for TwinOptions {
    fn default() -> Self {
        Self {
            fetch_story: true,
            force_refetch: false,
        }
    }
}

/// A device's associations together with its resolved story, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigitalTwin {
    pub associations: Associations,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<Story>,
}

impl DigitalTwin {
    /// The twin's display title: story title when available.
    pub fn title(&self) -> Option<&str> {
        self.story.as_ref().and_then(|story| story.title())
    }
}

/// Real-time context for one device, from the context endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceContext {
    /// Nearby devices ranked by signal strength
    #[serde(default)]
    pub nearest: Vec<NearestDevice>,
    /// Associated story URL, when the device has one
    #[serde(default)]
    pub url: Option<String>,
    /// Static identifier record, when advertised
    #[serde(default)]
    pub statid: Option<StatidRecord>,
}

impl DeviceContext {
    /// The best story URL for this device: explicit association first,
    /// then the advertised static identifier URI.
    pub fn story_url(&self) -> Option<&str> {
        if let Some(url) = self.url.as_deref() {
            return Some(url);
        }
        self.statid.as_ref().and_then(|statid| statid.uri.as_deref())
    }

    /// The signature of the nearest device, if known.
    pub fn nearest_device(&self) -> Option<&str> {
        self.nearest.first().map(|n| n.device.as_str())
    }
}

/// One entry in a device's nearest ranking.
#[derive(Debug, Clone, Deserialize)]
pub struct NearestDevice {
    /// Signature of the nearby device
    pub device: String,
    /// Received signal strength, when reported
    #[serde(default)]
    pub rssi: Option<i32>,
}

/// Statically-advertised identifier data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatidRecord {
    #[serde(default)]
    pub uri: Option<String>,
}

/// Context endpoint response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ContextEnvelope {
    #[serde(default)]
    pub(crate) devices: HashMap<String, DeviceContext>,
}
