//! Library records: documents and the flags used to tag them.

use crate::presentation::Rgba;
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct DocumentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct FlagId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FlagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An imported document. `id == None` marks a new, unsaved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<DocumentId>,
    pub name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub content: String,
    pub imported_date: DateTime<Utc>,
    #[serde(default)]
    pub flag_id: Option<FlagId>,
    #[serde(default)]
    pub voice_locale: Option<String>,
    #[serde(default)]
    pub last_page_index: Option<usize>,
}

impl Document {
    pub fn new(
        name: impl Into<String>,
        file_path: impl Into<String>,
        content: impl Into<String>,
        imported_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            file_path: file_path.into(),
            content: content.into(),
            imported_date,
            flag_id: None,
            voice_locale: None,
            last_page_index: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// A named, colored tag. `color` is `#RRGGBB` or `#AARRGGBB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    #[serde(default)]
    pub id: Option<FlagId>,
    pub name: String,
    pub color: String,
}

impl Flag {
    /// Build an unsaved flag. The name is trimmed and must not be empty.
    pub fn new(name: &str, color: impl Into<String>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            bail!("flag name must not be empty");
        }
        Ok(Self {
            id: None,
            name: name.to_string(),
            color: color.into(),
        })
    }

    /// Parsed color, or transparent when the stored value does not parse.
    pub fn rgba(&self) -> Rgba {
        parse_hex_color(&self.color).unwrap_or(Rgba::TRANSPARENT)
    }
}

/// Parse `#RRGGBB` or `#AARRGGBB` (leading `#` optional).
pub fn parse_hex_color(raw: &str) -> Option<Rgba> {
    let hex = raw.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !hex.is_ascii() {
        return None;
    }
    let byte = |at: usize| u8::from_str_radix(&hex[at..at + 2], 16).ok();
    let channel = |value: u8| f32::from(value) / 255.0;
    match hex.len() {
        6 => Some(Rgba {
            r: channel(byte(0)?),
            g: channel(byte(2)?),
            b: channel(byte(4)?),
            a: 1.0,
        }),
        8 => Some(Rgba {
            a: channel(byte(0)?),
            r: channel(byte(2)?),
            g: channel(byte(4)?),
            b: channel(byte(6)?),
        }),
        _ => None,
    }
}
