//! Wire types for the content backend and the typed descriptors built from them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Raw record returned by `/get_object`, `/generate` and `/retrieve`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortUrlRecord {
    pub short_code: Option<String>,
    pub short_url: Option<String>,
    pub qr_code: Option<String>,
    #[serde(rename = "type")]
    pub object_type: Option<String>,
    pub original: Option<String>,
    pub domain: Option<String>,
    /// Usually a string ("popup", "overlay" or embedded JSON). Some backends
    /// send a JSON object instead, which is kept as its serialized text.
    #[serde(deserialize_with = "metadata_as_string")]
    pub metadata: Option<String>,
}

fn metadata_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Content category named by the descriptor's `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentType {
    Video,
    Quiz,
    Model,
    /// Anything the client does not recognise; keeps the raw value for reporting.
    Unknown(String),
}

impl ContentType {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "video" => ContentType::Video,
            "quiz" => ContentType::Quiz,
            "3d" => ContentType::Model,
            _ => ContentType::Unknown(raw.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            ContentType::Video => "video",
            ContentType::Quiz => "quiz",
            ContentType::Model => "3d",
            ContentType::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Descriptor metadata: the raw wire string plus its key/value view when the
/// string is a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentMetadata {
    raw: String,
    fields: Option<Map<String, Value>>,
}

impl ContentMetadata {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let fields = match serde_json::from_str::<Value>(raw.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        };
        Self { raw, fields }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// True when the raw string is a JSON object.
    pub fn is_structured(&self) -> bool {
        self.fields.is_some()
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.fields.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.as_ref().and_then(|map| map.get(key))
    }

    /// String view of a scalar field. Numbers are rendered in decimal; null,
    /// empty strings and non-scalars yield `None`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// What the backend says should be shown for a marker or short code.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDescriptor {
    pub content_type: ContentType,
    /// URL or id of the payload (video URL, bundle URL, quiz resource).
    pub payload_ref: String,
    pub metadata: ContentMetadata,
    pub short_code: Option<String>,
}

impl ContentDescriptor {
    pub fn new(content_type: ContentType, payload_ref: impl Into<String>, metadata: &str) -> Self {
        Self {
            content_type,
            payload_ref: payload_ref.into(),
            metadata: ContentMetadata::parse(metadata),
            short_code: None,
        }
    }
}

impl From<ShortUrlRecord> for ContentDescriptor {
    fn from(record: ShortUrlRecord) -> Self {
        Self {
            content_type: ContentType::from_wire(record.object_type.as_deref().unwrap_or_default()),
            payload_ref: record.short_url.unwrap_or_default(),
            metadata: ContentMetadata::parse(record.metadata.unwrap_or_default()),
            short_code: record.short_code,
        }
    }
}

/// Quiz fields returned by `/retrieve_quiz` and `/retrieve_quizzes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizPayload {
    pub id: Option<i64>,
    pub questions: Option<String>,
    pub answer_a: Option<String>,
    pub answer_b: Option<String>,
    pub answer_c: Option<String>,
    pub answer_d: Option<String>,
    /// Either the text of the correct answer or its slot letter.
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub image: Option<String>,
}

/// Listing returned by `/get_file_collection`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCollection {
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Downloaded asset bundle. Loading assets out of it is the asset loader's job.
#[derive(Clone, PartialEq)]
pub struct BundleHandle {
    pub location: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for BundleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleHandle")
            .field("location", &self.location)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Downloaded image bytes, handed to the presenter undecoded.
#[derive(Clone, PartialEq)]
pub struct ImageHandle {
    pub location: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("location", &self.location)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
