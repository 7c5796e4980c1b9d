//! Sequential, cancellable read-aloud playback over paginated phrases.

mod controller;
mod state;

pub use controller::{PageListener, PlaybackController, PlaybackSettings};
pub use state::{
    Cursor, HighlightMark, MarkKind, PlayOutcome, PlaybackSnapshot, PlaybackState, ResumeIntent,
};
