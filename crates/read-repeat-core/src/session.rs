use crate::config::{AppConfig, ThemeMode};
use crate::document::{Document, DocumentId};
use crate::error::PlaybackError;
use crate::pagination::paginate;
use crate::persistence::PositionBridge;
use crate::playback::{
    Cursor, PlayOutcome, PlaybackController, PlaybackSettings, PlaybackSnapshot,
};
use crate::presentation::{Palette, PhraseStyle, page_presentation};
use crate::speech::{self, Locale, SpeechService};
use crate::store::DocumentStore;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct PhraseView {
    pub text: String,
    pub style: PhraseStyle,
}

/// Everything a view layer needs to render the current page.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ReaderView {
    pub document_id: Option<DocumentId>,
    pub document_name: String,
    pub current_page: usize,
    pub total_pages: usize,
    pub page_text: String,
    pub phrases: Vec<PhraseView>,
    pub playback: PlaybackSnapshot,
    pub voice: Option<Locale>,
    pub theme: ThemeMode,
}

/// One open document: pages, playback, voice choice and position
/// persistence wired together.
pub struct ReaderSession<S, D> {
    document: Document,
    controller: PlaybackController<S>,
    bridge: Arc<PositionBridge<D>>,
    voices: Vec<Locale>,
    theme: ThemeMode,
    palette: Palette,
}

impl<S: SpeechService, D: DocumentStore> ReaderSession<S, D> {
    /// Open a stored document, restoring its page and voice.
    pub async fn open(
        store: Arc<D>,
        speech: Arc<S>,
        id: DocumentId,
        config: &AppConfig,
    ) -> Result<Self> {
        let document = store
            .get_document(id)?
            .with_context(|| format!("document {id} not found"))?;
        Ok(Self::build(document, store, speech, config).await)
    }

    /// Open an unsaved scratch document. Its position is not persisted
    /// until [`ReaderSession::save`] succeeds.
    pub async fn open_new(
        store: Arc<D>,
        speech: Arc<S>,
        name: &str,
        content: String,
        config: &AppConfig,
    ) -> Self {
        let document = Document::new(name, "", content, Utc::now());
        Self::build(document, store, speech, config).await
    }

    async fn build(document: Document, store: Arc<D>, speech: Arc<S>, config: &AppConfig) -> Self {
        let voices = match speech.list_voices().await {
            Ok(voices) => voices,
            Err(err) => {
                warn!("Failed to list voices: {err}");
                Vec::new()
            }
        };

        let controller =
            PlaybackController::new(Arc::clone(&speech), PlaybackSettings::from(config));
        let bridge = PositionBridge::spawn(store);
        controller.set_page_listener(bridge.clone());

        let pages = paginate(&document.content);
        {
            let _restoring = bridge.restoring();
            let page = bridge.restore(&document, pages.len());
            controller.load(pages, page);
        }

        let voice = document
            .voice_locale
            .as_deref()
            .and_then(|id| speech::resolve_voice(&voices, id));
        if voice.is_none() && document.voice_locale.is_some() {
            warn!(
                voice = ?document.voice_locale,
                "Saved voice is not available; choose another"
            );
        }
        controller.set_voice(voice);

        info!(
            document = ?document.id,
            name = %document.name,
            pages = controller.snapshot().page_count,
            voices = voices.len(),
            "Reader session opened"
        );
        Self {
            document,
            controller,
            bridge,
            voices,
            theme: config.theme,
            palette: Palette::for_theme(config.theme, config.highlight()),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn controller(&self) -> &PlaybackController<S> {
        &self.controller
    }

    pub fn voices(&self) -> &[Locale] {
        &self.voices
    }

    pub fn filter_voices(&self, query: &str) -> Vec<Locale> {
        speech::filter_voices(&self.voices, query)
    }

    /// Pick a voice by id; saved documents remember it.
    pub fn select_voice(&mut self, id: &str) -> Result<Locale> {
        let voice = speech::resolve_voice(&self.voices, id)
            .with_context(|| format!("voice {id:?} is not available"))?;
        self.controller.set_voice(Some(voice.clone()));
        self.document.voice_locale = Some(voice.id.clone());

        if let Some(doc_id) = self.document.id {
            self.bridge
                .store()
                .set_voice_locale(doc_id, Some(&voice.id))
                .with_context(|| format!("remembering voice for document {doc_id}"))?;
        }
        Ok(voice)
    }

    pub async fn play(&self) -> Result<PlayOutcome, PlaybackError> {
        self.controller.play(None).await
    }

    pub async fn play_from(&self, page: usize, phrase: usize) -> Result<PlayOutcome, PlaybackError> {
        self.controller.play(Some(Cursor::new(page, phrase))).await
    }

    pub fn pause(&self) -> bool {
        self.controller.pause()
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn jump_to_page(&self, page_number: usize) -> Result<(), PlaybackError> {
        self.controller.jump_to_page(page_number)
    }

    pub fn select_phrase(&self, page: usize, phrase: usize) -> Result<(), PlaybackError> {
        self.controller.select_phrase(page, phrase)
    }

    pub fn toggle_repeat(&self) -> bool {
        self.controller.toggle_repeat()
    }

    /// Replace the document text and repaginate, keeping the current page
    /// when it still exists. Playback is abandoned.
    pub fn edit_content(&mut self, content: String) {
        self.controller.stop();
        let page = self.controller.snapshot().cursor.page;
        self.document.content = content;
        let pages = paginate(&self.document.content);
        info!(pages = pages.len(), "Document content edited");
        self.controller.load(pages, page);
    }

    /// Insert or update the document. After the first save the reading
    /// position is persisted.
    ///
    /// Updates only touch name, content and voice, so a position write in
    /// flight on the bridge is never undone.
    pub fn save(&mut self, name: Option<&str>) -> Result<DocumentId> {
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                bail!("document name must not be empty");
            }
            self.document.name = name.to_string();
        }
        let page = self.controller.snapshot().cursor.page;
        let store = Arc::clone(self.bridge.store());

        let id = match self.document.id {
            Some(id) => {
                let name = &self.document.name;
                let content = &self.document.content;
                let voice = &self.document.voice_locale;
                store.update_document(id, &mut |stored: &mut Document| {
                    stored.name.clone_from(name);
                    stored.content.clone_from(content);
                    stored.voice_locale.clone_from(voice);
                })?;
                id
            }
            None => {
                self.document.last_page_index = Some(page);
                let mut fresh = self.document.clone();
                let id = store.save_document(&mut fresh)?;
                self.document.id = Some(id);
                self.bridge.attach(id, page);
                id
            }
        };
        info!(document = %id, name = %self.document.name, "Document saved");
        Ok(id)
    }

    pub fn view(&self) -> ReaderView {
        let playback = self.controller.snapshot();
        let pages = self.controller.pages();
        let current_page = playback.cursor.page;
        let (page_text, phrases) = match pages.get(current_page) {
            Some(page) => {
                let styles =
                    page_presentation(&playback, current_page, page.phrase_count(), &self.palette);
                let phrases = page
                    .phrases
                    .iter()
                    .zip(styles)
                    .map(|(text, style)| PhraseView {
                        text: text.clone(),
                        style,
                    })
                    .collect();
                (page.text.clone(), phrases)
            }
            None => (String::new(), Vec::new()),
        };
        ReaderView {
            document_id: self.document.id,
            document_name: self.document.name.clone(),
            current_page,
            total_pages: pages.len(),
            page_text,
            phrases,
            playback,
            voice: self.controller.voice(),
            theme: self.theme,
        }
    }

    /// Stop playback and wait for pending position writes.
    pub async fn close(self) {
        self.controller.stop();
        self.bridge.flush().await;
        info!(document = ?self.document.id, "Reader session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackState;
    use crate::presentation::PhraseTone;
    use crate::speech::testing::ScriptedSpeech;
    use crate::document::{Flag, FlagId};
    use crate::store::MemoryStore;
    use std::time::Duration;

    /// Store whose reads return a copy taken before a pause and whose
    /// updates wait before applying, widening any read-modify-write window.
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl DocumentStore for SlowStore {
        fn list_documents(&self) -> Result<Vec<Document>> {
            self.inner.list_documents()
        }

        fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
            let document = self.inner.get_document(id)?;
            std::thread::sleep(self.delay);
            Ok(document)
        }

        fn save_document(&self, document: &mut Document) -> Result<DocumentId> {
            self.inner.save_document(document)
        }

        fn update_document(
            &self,
            id: DocumentId,
            apply: &mut dyn FnMut(&mut Document),
        ) -> Result<Document> {
            std::thread::sleep(self.delay);
            self.inner.update_document(id, apply)
        }

        fn delete_document(&self, id: DocumentId) -> Result<bool> {
            self.inner.delete_document(id)
        }

        fn list_flags(&self) -> Result<Vec<Flag>> {
            self.inner.list_flags()
        }

        fn get_flag(&self, id: FlagId) -> Result<Option<Flag>> {
            self.inner.get_flag(id)
        }

        fn save_flag(&self, flag: &mut Flag) -> Result<FlagId> {
            self.inner.save_flag(flag)
        }

        fn delete_flag(&self, id: FlagId) -> Result<bool> {
            self.inner.delete_flag(id)
        }
    }

    const TEXT: &str = "A1. A2. A3.\n\nB1. B2.\n\nC1.";

    fn stored_document(store: &MemoryStore, last_page: Option<usize>, voice: Option<&str>) -> DocumentId {
        let mut document = Document::new("Lecture", "/tmp/lecture.txt", TEXT, Utc::now());
        document.last_page_index = last_page;
        document.voice_locale = voice.map(str::to_string);
        store.save_document(&mut document).expect("seed document")
    }

    #[tokio::test]
    async fn open_restores_page_and_voice_without_writing() {
        let store = Arc::new(MemoryStore::new());
        let id = stored_document(&store, Some(2), Some("fr-FR-1"));
        let seeded = store.save_count();
        let (speech, _started) = ScriptedSpeech::auto();

        let session = ReaderSession::open(Arc::clone(&store), Arc::new(speech), id, &AppConfig::default())
            .await
            .expect("open");
        let view = session.view();
        assert_eq!(view.current_page, 2);
        assert_eq!(view.total_pages, 3);
        assert_eq!(view.page_text, "C1.");
        assert_eq!(view.voice.map(|voice| voice.id), Some("fr-FR-1".to_string()));

        session.close().await;
        assert_eq!(store.save_count(), seeded);
    }

    #[tokio::test]
    async fn playback_persists_last_page() {
        let store = Arc::new(MemoryStore::new());
        let id = stored_document(&store, None, Some("en-US-1"));
        let (speech, _started) = ScriptedSpeech::auto();
        let session = ReaderSession::open(Arc::clone(&store), Arc::new(speech), id, &AppConfig::default())
            .await
            .expect("open");

        assert_eq!(session.play().await, Ok(PlayOutcome::Completed));
        let view = session.view();
        assert_eq!(view.playback.state, PlaybackState::Completed);
        assert_eq!(view.phrases[0].style.tone, PhraseTone::Read);
        session.close().await;

        let stored = store.get_document(id).expect("get").expect("exists");
        assert_eq!(stored.last_page_index, Some(2));
    }

    #[tokio::test]
    async fn missing_document_fails_to_open() {
        let store = Arc::new(MemoryStore::new());
        let (speech, _started) = ScriptedSpeech::auto();
        let opened =
            ReaderSession::open(store, Arc::new(speech), DocumentId(404), &AppConfig::default()).await;
        assert!(opened.is_err());
    }

    #[tokio::test]
    async fn scratch_document_persists_only_after_save() {
        let store = Arc::new(MemoryStore::new());
        let (speech, _started) = ScriptedSpeech::auto();
        let mut session = ReaderSession::open_new(
            Arc::clone(&store),
            Arc::new(speech),
            "Scratch",
            TEXT.to_string(),
            &AppConfig::default(),
        )
        .await;

        assert_eq!(session.play().await, Err(PlaybackError::VoiceNotSelected));
        session.jump_to_page(2).expect("jump");
        assert_eq!(store.save_count(), 0);

        let id = session.save(Some("  Saved scratch ")).expect("save");
        assert_eq!(session.document().id, Some(id));
        let stored = store.get_document(id).expect("get").expect("exists");
        assert_eq!(stored.name, "Saved scratch");
        assert_eq!(stored.last_page_index, Some(1));

        session.jump_to_page(3).expect("jump");
        session.close().await;
        let stored = store.get_document(id).expect("get").expect("exists");
        assert_eq!(stored.last_page_index, Some(2));
    }

    #[tokio::test]
    async fn selecting_voice_is_remembered_for_saved_documents() {
        let store = Arc::new(MemoryStore::new());
        let id = stored_document(&store, None, None);
        let (speech, _started) = ScriptedSpeech::auto();
        let mut session = ReaderSession::open(Arc::clone(&store), Arc::new(speech), id, &AppConfig::default())
            .await
            .expect("open");

        assert!(session.select_voice("nope").is_err());
        let voice = session.select_voice("fr-FR-1").expect("voice exists");
        assert_eq!(voice.country, "France");
        assert_eq!(session.filter_voices("france").len(), 1);

        let stored = store.get_document(id).expect("get").expect("exists");
        assert_eq!(stored.voice_locale.as_deref(), Some("fr-FR-1"));
        session.close().await;
    }

    #[tokio::test]
    async fn editing_content_repaginates_and_clamps_page() {
        let store = Arc::new(MemoryStore::new());
        let id = stored_document(&store, Some(2), None);
        let (speech, _started) = ScriptedSpeech::auto();
        let mut session = ReaderSession::open(Arc::clone(&store), Arc::new(speech), id, &AppConfig::default())
            .await
            .expect("open");

        session.edit_content("Only one page now. Two phrases.".to_string());
        let view = session.view();
        assert_eq!(view.total_pages, 1);
        assert_eq!(view.current_page, 0);
        assert_eq!(view.phrases.len(), 2);
        assert_eq!(view.playback.mark, None);
        session.close().await;

        let stored = store.get_document(id).expect("get").expect("exists");
        assert_eq!(stored.last_page_index, Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn save_during_slow_position_write_keeps_the_edit() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(300),
        });
        let id = stored_document(&store.inner, None, Some("en-US-1"));
        let (speech, _started) = ScriptedSpeech::auto();
        let mut session =
            ReaderSession::open(Arc::clone(&store), Arc::new(speech), id, &AppConfig::default())
                .await
                .expect("open");

        session.jump_to_page(2).expect("jump");
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.edit_content("Edited text.".to_string());
        session.save(None).expect("save");
        session.close().await;

        let stored = store.inner.get_document(id).expect("get").expect("exists");
        assert_eq!(stored.content, "Edited text.");
        assert_eq!(stored.voice_locale.as_deref(), Some("en-US-1"));
        assert_eq!(stored.last_page_index, Some(0));
    }
}
