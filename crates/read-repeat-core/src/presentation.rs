//! Per-phrase presentation derived from playback state.
//!
//! Nothing here is stored on phrases: tones are computed from the single
//! highlight mark in a [`PlaybackSnapshot`], and colors from the theme.

use crate::config::{HighlightColor, ThemeMode};
use crate::playback::{HighlightMark, MarkKind, PlaybackSnapshot};
use serde::Serialize;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl From<HighlightColor> for Rgba {
    fn from(color: HighlightColor) -> Self {
        Rgba::new(color.r, color.g, color.b, color.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PhraseTone {
    Normal,
    Active,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct PhraseStyle {
    pub tone: PhraseTone,
    pub foreground: Rgba,
    pub background: Rgba,
}

/// Theme-aware colors for the three phrase tones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub normal_fg: Rgba,
    pub active_fg: Rgba,
    pub active_bg: Rgba,
    pub read_fg: Rgba,
    pub neutral_bg: Rgba,
}

impl Palette {
    pub fn for_theme(theme: ThemeMode, highlight: HighlightColor) -> Self {
        let (normal_fg, read_fg) = match theme {
            ThemeMode::Day => (Rgba::new(0.1, 0.1, 0.1, 1.0), Rgba::new(0.45, 0.45, 0.45, 1.0)),
            ThemeMode::Night => (Rgba::new(0.9, 0.9, 0.9, 1.0), Rgba::new(0.55, 0.55, 0.55, 1.0)),
        };
        Self {
            normal_fg,
            active_fg: normal_fg,
            active_bg: highlight.into(),
            read_fg,
            neutral_bg: Rgba::TRANSPARENT,
        }
    }

    pub fn style(&self, tone: PhraseTone) -> PhraseStyle {
        let (foreground, background) = match tone {
            PhraseTone::Normal => (self.normal_fg, self.neutral_bg),
            PhraseTone::Active => (self.active_fg, self.active_bg),
            PhraseTone::Read => (self.read_fg, self.neutral_bg),
        };
        PhraseStyle {
            tone,
            foreground,
            background,
        }
    }
}

/// Tones for the `count` phrases of `page`. Only the marked phrase, if it
/// sits on this page, differs from normal.
pub fn phrase_tones(count: usize, mark: Option<HighlightMark>, page: usize) -> Vec<PhraseTone> {
    let mut tones = vec![PhraseTone::Normal; count];
    if let Some(mark) = mark.filter(|mark| mark.page == page) {
        if let Some(tone) = tones.get_mut(mark.phrase) {
            *tone = match mark.kind {
                MarkKind::Active => PhraseTone::Active,
                MarkKind::Read => PhraseTone::Read,
            };
        }
    }
    tones
}

pub fn page_presentation(
    snapshot: &PlaybackSnapshot,
    page: usize,
    count: usize,
    palette: &Palette,
) -> Vec<PhraseStyle> {
    phrase_tones(count, snapshot.mark, page)
        .into_iter()
        .map(|tone| palette.style(tone))
        .collect()
}

/// Indices (with their new style) whose style differs between two renders
/// of a page. Phrases only present in `next` are always included.
pub fn diff(previous: &[PhraseStyle], next: &[PhraseStyle]) -> Vec<(usize, PhraseStyle)> {
    next.iter()
        .enumerate()
        .filter(|(idx, style)| previous.get(*idx) != Some(*style))
        .map(|(idx, style)| (idx, *style))
        .collect()
}
