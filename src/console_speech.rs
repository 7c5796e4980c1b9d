//! Terminal speech backend: prints each phrase and holds it for as long as
//! it would take to say at the configured pace.

use read_repeat_core::cancellation::CancellationToken;
use read_repeat_core::speech::{Locale, SpeechError, SpeechOptions, SpeechService};
use std::time::Duration;
use tracing::debug;

pub struct ConsoleSpeech {
    words_per_minute: f32,
    voices: Vec<Locale>,
}

impl ConsoleSpeech {
    pub fn new(words_per_minute: f32) -> Self {
        Self {
            words_per_minute,
            voices: vec![
                Locale::new("console-en-us", "English", "Console", "United States"),
                Locale::new("console-en-gb", "English", "Console", "United Kingdom"),
                Locale::new("console-fr-fr", "French", "Console", "France"),
                Locale::new("console-de-de", "German", "Console", "Germany"),
            ],
        }
    }
}

fn utterance_duration(text: &str, words_per_minute: f32) -> Duration {
    let words = text.split_whitespace().count().max(1) as f32;
    Duration::from_secs_f32(words * 60.0 / words_per_minute.max(1.0))
}

impl SpeechService for ConsoleSpeech {
    async fn list_voices(&self) -> Result<Vec<Locale>, SpeechError> {
        Ok(self.voices.clone())
    }

    async fn speak(
        &self,
        text: &str,
        options: &SpeechOptions,
        cancel: CancellationToken,
    ) -> Result<(), SpeechError> {
        let hold = utterance_duration(text, self.words_per_minute);
        debug!(
            voice = %options.locale.id,
            pitch = options.pitch,
            volume = options.volume,
            hold_ms = hold.as_millis() as u64,
            "Speaking phrase"
        );
        if options.volume > 0.0 {
            println!("  {text}");
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(SpeechError::Cancelled),
            _ = tokio::time::sleep(hold) => Ok(()),
        }
    }
}
