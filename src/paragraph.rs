//! Paragraph records.
//!
//! On disk a paragraph is a flat JSON object and the chapter's sentinel is recognized by the
//! `is_end_paragraph` flag or the literal id `end_paragraph`. In memory the two kinds are
//! distinct variants, so whether a paragraph is the sentinel never depends on comparing ids.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::timestamp;

/// Id written for the sentinel paragraph.
pub const END_PARAGRAPH_ID: &str = "end_paragraph";

/// One entry of a chapter's ordered paragraph list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParagraphRecord", into = "ParagraphRecord")]
pub enum Paragraph {
    /// A user paragraph: text plus at most one audio attachment.
    Regular(RegularParagraph),

    /// The synthetic trailing paragraph marking the chapter's append point.
    End(EndParagraph),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegularParagraph {
    pub id: Uuid,
    pub text: String,
    /// File name (not path) of the attached recording inside the chapter's audio directory.
    pub audio: Option<String>,
    pub created_at: NaiveDateTime,
    /// Seconds between the end of the recording and the transcript arriving.
    pub transcribe_delay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndParagraph {
    pub created_at: NaiveDateTime,
}

impl RegularParagraph {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            audio: None,
            created_at: timestamp::now(),
            transcribe_delay: None,
        }
    }
}

impl EndParagraph {
    pub fn new() -> Self {
        Self {
            created_at: timestamp::now(),
        }
    }
}

impl Default for EndParagraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Paragraph {
    pub fn is_end(&self) -> bool {
        matches!(self, Paragraph::End(_))
    }

    pub fn as_regular(&self) -> Option<&RegularParagraph> {
        match self {
            Paragraph::Regular(p) => Some(p),
            Paragraph::End(_) => None,
        }
    }

    pub fn as_regular_mut(&mut self) -> Option<&mut RegularParagraph> {
        match self {
            Paragraph::Regular(p) => Some(p),
            Paragraph::End(_) => None,
        }
    }

    /// The paragraph's id, or `None` for the sentinel.
    pub fn regular_id(&self) -> Option<Uuid> {
        self.as_regular().map(|p| p.id)
    }

    pub fn text(&self) -> &str {
        match self {
            Paragraph::Regular(p) => &p.text,
            Paragraph::End(_) => "",
        }
    }

    pub fn created_at(&self) -> NaiveDateTime {
        match self {
            Paragraph::Regular(p) => p.created_at,
            Paragraph::End(p) => p.created_at,
        }
    }
}

/// The persisted shape shared by both variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParagraphRecord {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    audio: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    created_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "is_false")]
    is_end_paragraph: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transcribe_delay: Option<f64>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl TryFrom<ParagraphRecord> for Paragraph {
    type Error = Error;

    fn try_from(rec: ParagraphRecord) -> Result<Self, Self::Error> {
        if rec.is_end_paragraph || rec.id == END_PARAGRAPH_ID {
            return Ok(Paragraph::End(EndParagraph {
                created_at: rec.created_at,
            }));
        }

        let id = Uuid::parse_str(&rec.id)
            .map_err(|err| Error::invalid(format!("invalid paragraph id '{}': {err}", rec.id)))?;

        Ok(Paragraph::Regular(RegularParagraph {
            id,
            text: rec.text,
            audio: Some(rec.audio).filter(|a| !a.is_empty()),
            created_at: rec.created_at,
            transcribe_delay: rec.transcribe_delay,
        }))
    }
}

impl From<Paragraph> for ParagraphRecord {
    fn from(p: Paragraph) -> Self {
        match p {
            Paragraph::Regular(p) => ParagraphRecord {
                id: p.id.to_string(),
                text: p.text,
                audio: p.audio.unwrap_or_default(),
                created_at: p.created_at,
                is_end_paragraph: false,
                transcribe_delay: p.transcribe_delay,
            },
            Paragraph::End(p) => ParagraphRecord {
                id: END_PARAGRAPH_ID.to_owned(),
                text: String::new(),
                audio: String::new(),
                created_at: p.created_at,
                is_end_paragraph: true,
                transcribe_delay: None,
            },
        }
    }
}

impl Serialize for RegularParagraph {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ParagraphRecord::from(Paragraph::Regular(self.clone())).serialize(serializer)
    }
}
