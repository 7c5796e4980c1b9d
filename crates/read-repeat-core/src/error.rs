use crate::speech::SpeechError;
use thiserror::Error;

/// Errors surfaced by playback control operations.
///
/// Cancellation is never reported here; a cancelled run ends with
/// [`crate::playback::PlayOutcome::Cancelled`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no voice selected")]
    VoiceNotSelected,
    #[error("document has no readable text")]
    EmptyDocument,
    #[error("playback is running")]
    Busy,
    #[error("page {requested} is out of range (document has {total} pages)")]
    PageOutOfRange { requested: usize, total: usize },
    #[error("phrase {phrase} on page {page} is out of range")]
    PhraseOutOfRange { page: usize, phrase: usize },
    #[error("speech failed: {0}")]
    Speech(#[from] SpeechError),
}
