use serde::{Deserialize, Deserializer, Serialize};

/// One `(book, highlights)` tuple produced by a format reader.
#[derive(Debug, Clone)]
pub struct Submission {
    pub book: BookCandidate,
    pub highlights: Vec<ParsedHighlight>,
}

/// Book metadata as a reader saw it, before resolution against the store.
#[derive(Debug, Clone)]
pub struct BookCandidate {
    pub title: String,
    pub author: Option<String>,
    pub asin: Option<String>,
}

/// Highlight as a reader saw it. Only `content` is guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedHighlight {
    pub content: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub location: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

// Bookmarklet exports send `location` as either a JSON number or a string.
// It is stored as a string so lexical sorting in the store stays sane.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMetadata {
    pub original_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    pub uuid: String,
    pub date: String,
}

/// Book document as stored remotely. `id` is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub metadata: BookMetadata,
}

/// Book document before creation, without a store-assigned id.
#[derive(Debug, Clone, Serialize)]
pub struct NewBook {
    pub title: String,
    pub metadata: BookMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightMetadata {
    pub book_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlighted_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_by: Option<String>,
}

/// Highlight document as stored remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightRecord {
    pub id: String,
    pub title: String,
    pub path: String,
    pub body: String,
    pub metadata: HighlightMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewHighlight {
    pub title: String,
    pub path: String,
    pub body: String,
    pub metadata: HighlightMetadata,
}
