//! Speech service contract and voice picker helpers.

use crate::cancellation::CancellationToken;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use ts_rs::TS;

/// A synthesis voice. `id` is the opaque value persisted per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Locale {
    pub id: String,
    pub language: String,
    pub name: String,
    pub country: String,
}

impl Locale {
    pub fn new(
        id: impl Into<String>,
        language: impl Into<String>,
        name: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            language: language.into(),
            name: name.into(),
            country: country.into(),
        }
    }

    /// Display label used by voice pickers.
    pub fn label(&self) -> String {
        format!("{} - {} ({})", self.language, self.name, self.country)
    }

    fn matches(&self, needle: &str) -> bool {
        [&self.language, &self.name, &self.country]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOptions {
    pub locale: Locale,
    pub pitch: f32,
    pub volume: f32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpeechError {
    #[error("speech cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// Text-to-speech backend.
///
/// `speak` resolves once the utterance has finished and must fail with
/// [`SpeechError::Cancelled`] when `cancel` fires first. Callers also drop
/// the returned future on cancellation, so implementations must tolerate
/// being dropped mid-utterance.
pub trait SpeechService: Send + Sync + 'static {
    fn list_voices(&self) -> impl Future<Output = Result<Vec<Locale>, SpeechError>> + Send;

    fn speak(
        &self,
        text: &str,
        options: &SpeechOptions,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), SpeechError>> + Send;
}

/// Voices whose language, name or country contains `query`
/// (case-insensitive), sorted by label. An empty query returns every voice.
pub fn filter_voices(voices: &[Locale], query: &str) -> Vec<Locale> {
    let needle = query.trim().to_lowercase();
    let mut matched: Vec<Locale> = voices
        .iter()
        .filter(|voice| needle.is_empty() || voice.matches(&needle))
        .cloned()
        .collect();
    matched.sort_by_cached_key(Locale::label);
    matched
}

pub fn resolve_voice(voices: &[Locale], id: &str) -> Option<Locale> {
    voices.iter().find(|voice| voice.id == id).cloned()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::{Semaphore, mpsc};

    /// Scripted speech double.
    ///
    /// Every utterance is recorded and announced on the `started` channel.
    /// When gated, an utterance only completes after the test releases a
    /// permit with [`ScriptedSpeech::release`].
    pub(crate) struct ScriptedSpeech {
        voices: Vec<Locale>,
        spoken: Mutex<Vec<String>>,
        started: mpsc::UnboundedSender<String>,
        gate: Option<Arc<Semaphore>>,
        fail_on: Mutex<Option<String>>,
    }

    impl ScriptedSpeech {
        pub(crate) fn auto() -> (Self, mpsc::UnboundedReceiver<String>) {
            Self::build(None)
        }

        pub(crate) fn gated() -> (Self, mpsc::UnboundedReceiver<String>) {
            Self::build(Some(Arc::new(Semaphore::new(0))))
        }

        fn build(gate: Option<Arc<Semaphore>>) -> (Self, mpsc::UnboundedReceiver<String>) {
            let (started, rx) = mpsc::unbounded_channel();
            let speech = Self {
                voices: vec![
                    voice("en-US-1"),
                    Locale::new("fr-FR-1", "French", "Amelie", "France"),
                ],
                spoken: Mutex::new(Vec::new()),
                started,
                gate,
                fail_on: Mutex::new(None),
            };
            (speech, rx)
        }

        pub(crate) fn release(&self, count: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(count);
            }
        }

        pub(crate) fn fail_on(&self, text: &str) {
            *self.fail_on.lock().expect("fail_on lock") = Some(text.to_string());
        }

        pub(crate) fn spoken(&self) -> Vec<String> {
            self.spoken.lock().expect("spoken lock").clone()
        }
    }

    pub(crate) fn voice(id: &str) -> Locale {
        Locale::new(id, "English", "Ava", "United States")
    }

    impl SpeechService for ScriptedSpeech {
        async fn list_voices(&self) -> Result<Vec<Locale>, SpeechError> {
            Ok(self.voices.clone())
        }

        async fn speak(
            &self,
            text: &str,
            _options: &SpeechOptions,
            cancel: CancellationToken,
        ) -> Result<(), SpeechError> {
            self.spoken.lock().expect("spoken lock").push(text.to_string());
            let _ = self.started.send(text.to_string());
            let should_fail = self.fail_on.lock().expect("fail_on lock").as_deref() == Some(text);
            if let Some(gate) = &self.gate {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SpeechError::Cancelled),
                    permit = gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }
            if should_fail {
                return Err(SpeechError::Failed(format!("engine rejected {text:?}")));
            }
            if cancel.is_cancelled() {
                return Err(SpeechError::Cancelled);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices() -> Vec<Locale> {
        vec![
            Locale::new("de", "German", "Hans", "Germany"),
            Locale::new("en-gb", "English", "Oliver", "United Kingdom"),
            Locale::new("en-us", "English", "Ava", "United States"),
        ]
    }

    #[test]
    fn label_joins_language_name_country() {
        let voice = Locale::new("x", "English", "Ava", "United States");
        assert_eq!(voice.label(), "English - Ava (United States)");
    }

    #[test]
    fn empty_query_returns_sorted_list() {
        let labels: Vec<String> = filter_voices(&voices(), "  ")
            .iter()
            .map(Locale::label)
            .collect();
        assert_eq!(
            labels,
            vec![
                "English - Ava (United States)",
                "English - Oliver (United Kingdom)",
                "German - Hans (Germany)",
            ]
        );
    }

    #[test]
    fn query_matches_any_field_case_insensitively() {
        let ids = |query: &str| -> Vec<String> {
            filter_voices(&voices(), query)
                .into_iter()
                .map(|voice| voice.id)
                .collect()
        };
        assert_eq!(ids("ENGLISH"), vec!["en-us", "en-gb"]);
        assert_eq!(ids("kingdom"), vec!["en-gb"]);
        assert_eq!(ids("hans"), vec!["de"]);
        assert!(ids("klingon").is_empty());
    }

    #[test]
    fn resolves_voice_by_id() {
        assert_eq!(resolve_voice(&voices(), "de").map(|v| v.name), Some("Hans".into()));
        assert_eq!(resolve_voice(&voices(), "missing"), None);
    }
}
