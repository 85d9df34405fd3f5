use std::collections::HashMap;

use anyhow::Result;
use serde::Deserialize;

use crate::model::{BookCandidate, ParsedHighlight, Submission};

/// Raw export as handed to the readers: the message body, plus the text of
/// an attachment when one was shipped alongside (device clippings files
/// arrive as attachments).
#[derive(Debug, Clone)]
pub struct RawExport {
    pub body: String,
    pub attachment: Option<String>,
}

impl RawExport {
    fn attachment_or_body(&self) -> &str {
        self.attachment.as_deref().unwrap_or(&self.body)
    }
}

/// The closed set of export formats this system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    BookmarkletJson,
    AppEmail,
    DeviceClippings,
}

pub const FORMATS: [Format; 3] = [
    Format::BookmarkletJson,
    Format::AppEmail,
    Format::DeviceClippings,
];

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::BookmarkletJson => "bookmarklet-json",
            Format::AppEmail => "app-email",
            Format::DeviceClippings => "device-clippings",
        }
    }

    /// Cheap sniff: can this reader handle the given raw export?
    pub fn parseable(&self, raw: &RawExport) -> bool {
        match self {
            Format::BookmarkletJson => {
                serde_json::from_str::<JsonPayload>(raw.body.trim()).is_ok()
            }
            Format::AppEmail => {
                let trimmed = raw.body.trim_start();
                !trimmed.starts_with('{')
                    && !trimmed.starts_with('[')
                    && raw.body.lines().any(is_quoted_line)
            }
            Format::DeviceClippings => raw.attachment_or_body().contains(CLIPPINGS_SEPARATOR),
        }
    }

    pub fn parse(&self, raw: &RawExport) -> Result<Vec<Submission>> {
        match self {
            Format::BookmarkletJson => parse_bookmarklet_json(raw.body.trim()),
            Format::AppEmail => parse_app_email(&raw.body),
            Format::DeviceClippings => parse_clippings(raw.attachment_or_body()),
        }
    }
}

/// Runs every reader that claims the input and collects their tuples.
pub fn extract_all(raw: &RawExport) -> Result<Vec<Submission>> {
    let mut submissions = Vec::new();
    for format in FORMATS {
        if format.parseable(raw) {
            tracing::debug!(format = format.as_str(), "input claimed by reader");
            submissions.extend(format.parse(raw)?);
        }
    }
    Ok(submissions)
}

// ---- bookmarklet JSON ----

#[derive(Debug, Deserialize)]
struct JsonExport {
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    asin: Option<String>,
    highlights: Vec<ParsedHighlight>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonPayload {
    One(JsonExport),
    Many(Vec<JsonExport>),
}

fn parse_bookmarklet_json(body: &str) -> Result<Vec<Submission>> {
    let payload: JsonPayload = serde_json::from_str(body)?;
    let exports = match payload {
        JsonPayload::One(export) => vec![export],
        JsonPayload::Many(exports) => exports,
    };
    Ok(exports
        .into_iter()
        .map(|export| Submission {
            book: BookCandidate {
                title: export.title,
                author: export.author,
                asin: export.asin,
            },
            highlights: export.highlights,
        })
        .collect())
}

// ---- app-native email body ----

fn is_quoted_line(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 2 && line.starts_with('"') && line.ends_with('"')
}

/// Plain-text reading-app email: title on the first non-empty line, an
/// optional `by <author>` line, then quoted paragraphs each optionally
/// followed by `Location:` and `Added on` lines.
fn parse_app_email(body: &str) -> Result<Vec<Submission>> {
    let mut lines = body.lines().map(str::trim);
    let title = loop {
        match lines.next() {
            Some("") => continue,
            Some(line) => break line.to_string(),
            None => anyhow::bail!("empty email body"),
        }
    };

    let mut author = None;
    let mut highlights: Vec<ParsedHighlight> = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("by ") {
            if author.is_none() && highlights.is_empty() {
                author = Some(rest.trim().to_string());
                continue;
            }
        }
        if is_quoted_line(line) {
            highlights.push(ParsedHighlight {
                content: line[1..line.len() - 1].to_string(),
                date: None,
                location: None,
                comments: None,
                source: Some(Format::AppEmail.as_str().to_string()),
                user: None,
            });
        } else if let Some(rest) = line.strip_prefix("Location:") {
            if let Some(last) = highlights.last_mut() {
                last.location = Some(rest.trim().to_string());
            }
        } else if let Some(rest) = line.strip_prefix("Added on ") {
            if let Some(last) = highlights.last_mut() {
                last.date = Some(rest.trim().to_string());
            }
        }
    }

    Ok(vec![Submission {
        book: BookCandidate {
            title,
            author,
            asin: None,
        },
        highlights,
    }])
}

// ---- device clippings file ----

const CLIPPINGS_SEPARATOR: &str = "==========";

/// `My Clippings.txt`: blocks separated by `==========` lines. Line 1 is
/// `Title (Author)`, line 2 the highlight marker with location and date,
/// then a blank line and the highlighted text. Notes and bookmarks are
/// skipped. Tuples come out in first-seen title order.
fn parse_clippings(text: &str) -> Result<Vec<Submission>> {
    let mut submissions: Vec<Submission> = Vec::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for block in text.split(CLIPPINGS_SEPARATOR) {
        let mut lines = block
            .lines()
            .map(|l| l.trim_start_matches('\u{feff}').trim());

        let Some(title_line) = lines.find(|l| !l.is_empty()) else {
            continue;
        };
        let Some(marker) = lines.next() else {
            continue;
        };
        if !marker.starts_with("- Your Highlight") {
            continue;
        }

        let location = marker
            .split("Location ")
            .nth(1)
            .and_then(|rest| rest.split(|c| c == ' ' || c == '|').next())
            .map(str::to_string)
            .filter(|loc| !loc.is_empty());
        let date = marker
            .split("Added on ")
            .nth(1)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let content = lines.filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n");
        if content.is_empty() {
            continue;
        }

        let (title, author) = split_title_author(title_line);
        let highlight = ParsedHighlight {
            content,
            date,
            location,
            comments: None,
            source: Some(Format::DeviceClippings.as_str().to_string()),
            user: None,
        };

        match by_title.get(&title) {
            Some(&index) => submissions[index].highlights.push(highlight),
            None => {
                by_title.insert(title.clone(), submissions.len());
                submissions.push(Submission {
                    book: BookCandidate {
                        title,
                        author,
                        asin: None,
                    },
                    highlights: vec![highlight],
                });
            }
        }
    }

    Ok(submissions)
}

fn split_title_author(line: &str) -> (String, Option<String>) {
    match line.rsplit_once(" (") {
        Some((title, rest)) if rest.ends_with(')') => (
            title.trim().to_string(),
            Some(rest[..rest.len() - 1].to_string()),
        ),
        _ => (line.to_string(), None),
    }
}
