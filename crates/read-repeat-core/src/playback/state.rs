use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Completed,
}

/// Position of a phrase inside the paginated document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, TS)]
#[ts(export)]
pub struct Cursor {
    pub page: usize,
    pub phrase: usize,
}

impl Cursor {
    pub const fn new(page: usize, phrase: usize) -> Self {
        Self { page, phrase }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MarkKind {
    /// Currently being spoken.
    Active,
    /// Finished speaking.
    Read,
}

/// The single phrase that carries a highlight; every other phrase is normal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export)]
pub struct HighlightMark {
    pub page: usize,
    pub phrase: usize,
    pub kind: MarkKind,
}

impl HighlightMark {
    pub fn active(at: Cursor) -> Self {
        Self {
            page: at.page,
            phrase: at.phrase,
            kind: MarkKind::Active,
        }
    }

    pub fn read(at: Cursor) -> Self {
        Self {
            page: at.page,
            phrase: at.phrase,
            kind: MarkKind::Read,
        }
    }
}

/// Observable controller state, published on every transition.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default, TS)]
#[ts(export)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub cursor: Cursor,
    pub mark: Option<HighlightMark>,
    pub repeat: bool,
    pub page_count: usize,
    pub resume_point: Option<Cursor>,
    pub pending_selection: Option<Cursor>,
}

/// How a `play()` call finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Completed,
    Cancelled,
}

/// Where a new playback run starts, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeIntent {
    Paused(Cursor),
    UserSelected(Cursor),
    ReplayFromLastCompleted(Cursor),
    FromCursor(Cursor),
}

impl ResumeIntent {
    /// Resolve the start point once, in priority order: an explicit start,
    /// then a pending user selection, then the pause point, then the last
    /// completed position, then the current cursor.
    pub fn resolve(
        explicit: Option<Cursor>,
        selection: Option<Cursor>,
        state: PlaybackState,
        resume_point: Option<Cursor>,
        cursor: Cursor,
    ) -> Self {
        if let Some(start) = explicit.or(selection) {
            return ResumeIntent::UserSelected(start);
        }
        match state {
            PlaybackState::Paused => ResumeIntent::Paused(resume_point.unwrap_or(cursor)),
            PlaybackState::Completed => {
                ResumeIntent::ReplayFromLastCompleted(resume_point.unwrap_or(cursor))
            }
            PlaybackState::Idle | PlaybackState::Playing => ResumeIntent::FromCursor(cursor),
        }
    }

    pub fn start(self) -> Cursor {
        match self {
            ResumeIntent::Paused(at)
            | ResumeIntent::UserSelected(at)
            | ResumeIntent::ReplayFromLastCompleted(at)
            | ResumeIntent::FromCursor(at) => at,
        }
    }
}
