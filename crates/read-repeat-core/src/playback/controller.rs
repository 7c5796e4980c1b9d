use super::state::{
    Cursor, HighlightMark, PlayOutcome, PlaybackSnapshot, PlaybackState, ResumeIntent,
};
use crate::cancellation::CancellationToken;
use crate::config::AppConfig;
use crate::error::PlaybackError;
use crate::pagination::{Page, is_blank_document, paginate};
use crate::speech::{Locale, SpeechError, SpeechOptions, SpeechService};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Receives the cursor's page whenever playback or navigation moves it.
pub trait PageListener: Send + Sync {
    fn on_page_changed(&self, page: usize);
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub repeat_delay: Duration,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PlaybackSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            repeat_delay: config.repeat_delay(),
            pitch: config.pitch,
            volume: config.volume,
        }
    }
}

struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

struct Core {
    pages: Arc<Vec<Page>>,
    state: PlaybackState,
    cursor: Cursor,
    mark: Option<HighlightMark>,
    resume_point: Option<Cursor>,
    user_selection: Option<Cursor>,
    repeat: bool,
    voice: Option<Locale>,
    active: Option<ActiveRun>,
    run_counter: u64,
    listener: Option<Arc<dyn PageListener>>,
}

impl Core {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            cursor: self.cursor,
            mark: self.mark,
            repeat: self.repeat,
            page_count: self.pages.len(),
            resume_point: self.resume_point,
            pending_selection: self.user_selection,
        }
    }

    fn owns(&self, run_id: u64) -> bool {
        self.active.as_ref().is_some_and(|run| run.id == run_id)
    }

    fn cancel_active(&mut self) {
        if let Some(run) = self.active.take() {
            debug!(run_id = run.id, "Cancelling playback run");
            run.token.cancel();
        }
    }

    fn contains(&self, at: Cursor) -> bool {
        self.pages
            .get(at.page)
            .is_some_and(|page| at.phrase < page.phrase_count())
    }

    /// Move the cursor, returning the listener to notify if the page changed.
    fn move_cursor(&mut self, to: Cursor) -> Option<Arc<dyn PageListener>> {
        let page_changed = self.cursor.page != to.page;
        self.cursor = to;
        if page_changed {
            self.listener.clone()
        } else {
            None
        }
    }
}

struct Shared<S> {
    speech: Arc<S>,
    settings: PlaybackSettings,
    core: Mutex<Core>,
    snapshots: watch::Sender<PlaybackSnapshot>,
}

/// Drives "speak, highlight, advance" over the loaded pages.
///
/// Cheap to clone; all clones share one state machine. At most one run owns
/// the controller at a time, and a run that lost ownership never touches
/// state again.
pub struct PlaybackController<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for PlaybackController<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: SpeechService> PlaybackController<S> {
    pub fn new(speech: Arc<S>, settings: PlaybackSettings) -> Self {
        let core = Core {
            pages: Arc::new(paginate("")),
            state: PlaybackState::Idle,
            cursor: Cursor::default(),
            mark: None,
            resume_point: None,
            user_selection: None,
            repeat: false,
            voice: None,
            active: None,
            run_counter: 0,
            listener: None,
        };
        let (snapshots, _) = watch::channel(core.snapshot());
        Self {
            shared: Arc::new(Shared {
                speech,
                settings,
                core: Mutex::new(core),
                snapshots,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, core: &Core) {
        self.shared.snapshots.send_replace(core.snapshot());
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.lock().snapshot()
    }

    pub fn pages(&self) -> Arc<Vec<Page>> {
        Arc::clone(&self.lock().pages)
    }

    pub fn voice(&self) -> Option<Locale> {
        self.lock().voice.clone()
    }

    pub fn set_voice(&self, voice: Option<Locale>) {
        let mut core = self.lock();
        info!(voice = ?voice.as_ref().map(|v| v.id.as_str()), "Voice selected");
        core.voice = voice;
    }

    pub fn set_page_listener(&self, listener: Arc<dyn PageListener>) {
        self.lock().listener = Some(listener);
    }

    /// Replace the page structure, abandoning any run and resetting
    /// presentation. The cursor lands on `initial_page` (clamped).
    pub fn load(&self, pages: Vec<Page>, initial_page: usize) {
        let listener = {
            let mut core = self.lock();
            core.cancel_active();
            core.pages = Arc::new(if pages.is_empty() { paginate("") } else { pages });
            let page = initial_page.min(core.pages.len() - 1);
            let listener = core.move_cursor(Cursor::new(page, 0));
            core.state = PlaybackState::Idle;
            core.mark = None;
            core.resume_point = None;
            core.user_selection = None;
            info!(pages = core.pages.len(), page = page + 1, "Loaded pages into controller");
            self.publish(&core);
            listener.map(|listener| (listener, page))
        };
        if let Some((listener, page)) = listener {
            listener.on_page_changed(page);
        }
    }

    /// Start or resume reading. Resolves when the run completes, fails, or
    /// loses ownership to `pause`, `stop`, `load` or another `play`.
    pub async fn play(&self, from: Option<Cursor>) -> Result<PlayOutcome, PlaybackError> {
        let (run_id, token, start, options) = {
            let mut core = self.lock();
            let locale = core.voice.clone().ok_or(PlaybackError::VoiceNotSelected)?;
            if is_blank_document(&core.pages) {
                return Err(PlaybackError::EmptyDocument);
            }
            if let Some(at) = from {
                if !core.contains(at) {
                    return Err(PlaybackError::PhraseOutOfRange {
                        page: at.page,
                        phrase: at.phrase,
                    });
                }
            }

            let selection = core.user_selection.take();
            let intent =
                ResumeIntent::resolve(from, selection, core.state, core.resume_point, core.cursor);
            let mut start = intent.start();
            if !core.contains(start) {
                start = Cursor::default();
            }

            core.cancel_active();
            core.run_counter = core.run_counter.wrapping_add(1);
            let run_id = core.run_counter;
            let token = CancellationToken::new();
            core.active = Some(ActiveRun {
                id: run_id,
                token: token.clone(),
            });
            core.state = PlaybackState::Playing;
            core.resume_point = None;
            info!(
                run_id,
                ?intent,
                page = start.page + 1,
                phrase = start.phrase,
                "Starting playback run"
            );
            self.publish(&core);

            let options = SpeechOptions {
                locale,
                pitch: self.shared.settings.pitch,
                volume: self.shared.settings.volume,
            };
            (run_id, token, start, options)
        };

        self.run(run_id, token, start, options).await
    }

    async fn run(
        &self,
        run_id: u64,
        token: CancellationToken,
        mut start: Cursor,
        options: SpeechOptions,
    ) -> Result<PlayOutcome, PlaybackError> {
        loop {
            let pages = Arc::clone(&self.lock().pages);
            for (page_idx, page) in pages.iter().enumerate().skip(start.page) {
                let first = if page_idx == start.page { start.phrase } else { 0 };
                for (phrase_idx, text) in page.phrases.iter().enumerate().skip(first) {
                    if text.is_empty() {
                        continue;
                    }
                    let at = Cursor::new(page_idx, phrase_idx);
                    if !self.enter_phrase(run_id, at) {
                        return Ok(PlayOutcome::Cancelled);
                    }

                    let spoken = tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(SpeechError::Cancelled),
                        result = self.shared.speech.speak(text, &options, token.clone()) => result,
                    };
                    match spoken {
                        Ok(()) => {
                            let mut core = self.lock();
                            if !core.owns(run_id) {
                                return Ok(PlayOutcome::Cancelled);
                            }
                            core.mark = Some(HighlightMark::read(at));
                            self.publish(&core);
                        }
                        Err(SpeechError::Cancelled) => {
                            debug!(run_id, page = page_idx + 1, phrase = phrase_idx, "Speech cancelled");
                            return Ok(PlayOutcome::Cancelled);
                        }
                        Err(err) => {
                            self.abandon(run_id, &err);
                            return Err(PlaybackError::Speech(err));
                        }
                    }
                }
            }

            if let Some(outcome) = self.finish_pass(run_id) {
                return Ok(outcome);
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(PlayOutcome::Cancelled),
                _ = tokio::time::sleep(self.shared.settings.repeat_delay) => {}
            }
            if let Some(outcome) = self.finish_pass(run_id) {
                return Ok(outcome);
            }
            debug!(run_id, "Repeating document from the first page");
            start = Cursor::default();
        }
    }

    /// Mark `at` as the phrase being spoken. False when the run lost
    /// ownership.
    fn enter_phrase(&self, run_id: u64, at: Cursor) -> bool {
        let listener = {
            let mut core = self.lock();
            if !core.owns(run_id) {
                return false;
            }
            let listener = core.move_cursor(at);
            core.mark = Some(HighlightMark::active(at));
            debug!(run_id, page = at.page + 1, phrase = at.phrase, "Speaking phrase");
            self.publish(&core);
            listener
        };
        if let Some(listener) = listener {
            listener.on_page_changed(at.page);
        }
        true
    }

    /// End-of-pass bookkeeping. `None` means repeat is on and the run keeps
    /// ownership.
    fn finish_pass(&self, run_id: u64) -> Option<PlayOutcome> {
        let mut core = self.lock();
        if !core.owns(run_id) {
            return Some(PlayOutcome::Cancelled);
        }
        if core.repeat {
            return None;
        }
        core.active = None;
        core.state = PlaybackState::Completed;
        core.resume_point = Some(core.cursor);
        info!(
            run_id,
            page = core.cursor.page + 1,
            phrase = core.cursor.phrase,
            "Playback completed"
        );
        self.publish(&core);
        Some(PlayOutcome::Completed)
    }

    fn abandon(&self, run_id: u64, err: &SpeechError) {
        let mut core = self.lock();
        if !core.owns(run_id) {
            return;
        }
        warn!(run_id, "Abandoning playback after speech failure: {err}");
        core.active = None;
        core.state = PlaybackState::Idle;
        core.mark = None;
        core.resume_point = None;
        self.publish(&core);
    }

    /// Cancel the in-flight phrase and remember where to resume. Returns
    /// false when nothing was playing.
    pub fn pause(&self) -> bool {
        let mut core = self.lock();
        if core.state != PlaybackState::Playing {
            return false;
        }
        core.cancel_active();
        core.state = PlaybackState::Paused;
        core.resume_point = Some(core.cursor);
        info!(
            page = core.cursor.page + 1,
            phrase = core.cursor.phrase,
            "Playback paused"
        );
        self.publish(&core);
        true
    }

    /// Abandon playback without keeping a resume point.
    pub fn stop(&self) {
        let mut core = self.lock();
        core.cancel_active();
        core.state = PlaybackState::Idle;
        core.mark = None;
        core.resume_point = None;
        core.user_selection = None;
        debug!("Playback stopped");
        self.publish(&core);
    }

    /// Move to the start of a 1-based page without starting playback.
    pub fn jump_to_page(&self, page_number: usize) -> Result<(), PlaybackError> {
        let listener = {
            let mut core = self.lock();
            if core.state == PlaybackState::Playing {
                return Err(PlaybackError::Busy);
            }
            let total = core.pages.len();
            if page_number == 0 || page_number > total {
                return Err(PlaybackError::PageOutOfRange {
                    requested: page_number,
                    total,
                });
            }
            let target = Cursor::new(page_number - 1, 0);
            let listener = core.move_cursor(target);
            core.state = PlaybackState::Idle;
            core.mark = None;
            core.resume_point = None;
            // The jump target is the cursor now; an older selection must not win.
            core.user_selection = None;
            info!(page = page_number, "Jumped to page");
            self.publish(&core);
            listener
        };
        if let Some(listener) = listener {
            listener.on_page_changed(page_number - 1);
        }
        Ok(())
    }

    /// Choose where the next `play()` starts. Outside playback the cursor
    /// moves there immediately.
    pub fn select_phrase(&self, page: usize, phrase: usize) -> Result<(), PlaybackError> {
        let target = Cursor::new(page, phrase);
        let listener = {
            let mut core = self.lock();
            if !core.contains(target) {
                return Err(PlaybackError::PhraseOutOfRange { page, phrase });
            }
            core.user_selection = Some(target);
            let listener = if core.state == PlaybackState::Playing {
                None
            } else {
                core.mark = None;
                core.move_cursor(target)
            };
            debug!(page = page + 1, phrase, "Phrase selected");
            self.publish(&core);
            listener
        };
        if let Some(listener) = listener {
            listener.on_page_changed(page);
        }
        Ok(())
    }

    /// Flip repeat mode, returning the new value.
    pub fn toggle_repeat(&self) -> bool {
        let mut core = self.lock();
        core.repeat = !core.repeat;
        info!(repeat = core.repeat, "Repeat toggled");
        self.publish(&core);
        core.repeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::testing::{ScriptedSpeech, voice};

    struct RecordingListener(std::sync::Mutex<Vec<usize>>);

    impl PageListener for RecordingListener {
        fn on_page_changed(&self, page: usize) {
            self.0.lock().expect("listener lock").push(page);
        }
    }

    fn settings() -> PlaybackSettings {
        PlaybackSettings {
            repeat_delay: Duration::from_millis(10),
            pitch: 1.0,
            volume: 1.0,
        }
    }

    fn three_two() -> Vec<Page> {
        paginate("A1. A2. A3.\n\nB1. B2.")
    }

    fn controller(speech: &Arc<ScriptedSpeech>) -> PlaybackController<ScriptedSpeech> {
        let controller = PlaybackController::new(Arc::clone(speech), settings());
        controller.set_voice(Some(voice("en-US-1")));
        controller.load(three_two(), 0);
        controller
    }

    fn spawn_play(
        controller: &PlaybackController<ScriptedSpeech>,
    ) -> tokio::task::JoinHandle<Result<PlayOutcome, PlaybackError>> {
        let controller = controller.clone();
        tokio::spawn(async move { controller.play(None).await })
    }

    #[tokio::test]
    async fn reads_every_phrase_in_order_then_completes() {
        let (speech, _started) = ScriptedSpeech::auto();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        let pages_seen = Arc::new(RecordingListener(std::sync::Mutex::new(Vec::new())));
        controller.set_page_listener(pages_seen.clone());
        let mut updates = controller.subscribe();

        let outcome = controller.play(None).await;

        assert_eq!(outcome, Ok(PlayOutcome::Completed));
        assert_eq!(speech.spoken(), vec!["A1.", "A2.", "A3.", "B1.", "B2."]);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Completed);
        assert_eq!(snapshot.resume_point, Some(Cursor::new(1, 1)));
        assert_eq!(snapshot.mark, Some(HighlightMark::read(Cursor::new(1, 1))));
        assert_eq!(*pages_seen.0.lock().expect("listener lock"), vec![1]);
        assert!(updates.has_changed().expect("sender alive"));
        assert_eq!(updates.borrow_and_update().state, PlaybackState::Completed);
    }

    #[tokio::test]
    async fn pause_then_play_resumes_at_pause_point() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        let runner = spawn_play(&controller);

        assert_eq!(started.recv().await.as_deref(), Some("A1."));
        speech.release(1);
        assert_eq!(started.recv().await.as_deref(), Some("A2."));
        assert!(controller.pause());
        assert_eq!(runner.await.expect("join"), Ok(PlayOutcome::Cancelled));

        let paused = controller.snapshot();
        assert_eq!(paused.state, PlaybackState::Paused);
        assert_eq!(paused.resume_point, Some(Cursor::new(0, 1)));
        assert_eq!(paused.mark, Some(HighlightMark::active(Cursor::new(0, 1))));
        assert!(!controller.pause());

        speech.release(10);
        assert_eq!(controller.play(None).await, Ok(PlayOutcome::Completed));
        assert_eq!(
            speech.spoken(),
            vec!["A1.", "A2.", "A2.", "A3.", "B1.", "B2."]
        );
    }

    #[tokio::test]
    async fn selection_overrides_resume_exactly_once() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        let runner = spawn_play(&controller);

        assert_eq!(started.recv().await.as_deref(), Some("A1."));
        speech.release(1);
        assert_eq!(started.recv().await.as_deref(), Some("A2."));
        assert!(controller.pause());
        assert_eq!(runner.await.expect("join"), Ok(PlayOutcome::Cancelled));

        controller.select_phrase(1, 0).expect("selection in range");
        assert_eq!(controller.snapshot().cursor, Cursor::new(1, 0));
        assert_eq!(controller.snapshot().mark, None);

        speech.release(10);
        assert_eq!(controller.play(None).await, Ok(PlayOutcome::Completed));
        assert_eq!(speech.spoken()[2..], ["B1.", "B2."]);
        assert_eq!(controller.snapshot().pending_selection, None);

        speech.release(10);
        assert_eq!(controller.play(None).await, Ok(PlayOutcome::Completed));
        assert_eq!(speech.spoken()[4..], ["B2."]);
    }

    #[tokio::test]
    async fn pause_after_consumed_selection_resumes_normally() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        let first = spawn_play(&controller);

        assert_eq!(started.recv().await.as_deref(), Some("A1."));
        speech.release(1);
        assert_eq!(started.recv().await.as_deref(), Some("A2."));
        assert!(controller.pause());
        assert_eq!(first.await.expect("join"), Ok(PlayOutcome::Cancelled));

        controller.select_phrase(1, 0).expect("selection in range");
        let second = spawn_play(&controller);
        assert_eq!(started.recv().await.as_deref(), Some("B1."));
        assert_eq!(controller.snapshot().pending_selection, None);
        speech.release(1);
        assert_eq!(started.recv().await.as_deref(), Some("B2."));
        assert!(controller.pause());
        assert_eq!(second.await.expect("join"), Ok(PlayOutcome::Cancelled));
        assert_eq!(controller.snapshot().resume_point, Some(Cursor::new(1, 1)));

        speech.release(10);
        assert_eq!(controller.play(None).await, Ok(PlayOutcome::Completed));
        assert_eq!(
            speech.spoken(),
            vec!["A1.", "A2.", "B1.", "B2.", "B2."]
        );
    }

    #[tokio::test]
    async fn jump_discards_an_earlier_selection() {
        let (speech, _started) = ScriptedSpeech::auto();
        let speech = Arc::new(speech);
        let controller = controller(&speech);

        controller.select_phrase(1, 1).expect("selection in range");
        assert_eq!(controller.snapshot().pending_selection, Some(Cursor::new(1, 1)));
        controller.jump_to_page(1).expect("page 1 exists");
        assert_eq!(controller.snapshot().pending_selection, None);

        assert_eq!(controller.play(None).await, Ok(PlayOutcome::Completed));
        assert_eq!(speech.spoken(), vec!["A1.", "A2.", "A3.", "B1.", "B2."]);
    }

    #[tokio::test]
    async fn repeat_restarts_from_first_phrase() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        assert!(controller.toggle_repeat());
        let runner = spawn_play(&controller);

        let mut heard = Vec::new();
        for _ in 0..6 {
            let phrase = started.recv().await.expect("phrase started");
            heard.push(phrase);
            if heard.len() < 6 {
                speech.release(1);
            }
        }
        assert_eq!(heard, vec!["A1.", "A2.", "A3.", "B1.", "B2.", "A1."]);
        assert_eq!(controller.snapshot().cursor, Cursor::new(0, 0));

        controller.stop();
        assert_eq!(runner.await.expect("join"), Ok(PlayOutcome::Cancelled));
        let stopped = controller.snapshot();
        assert_eq!(stopped.state, PlaybackState::Idle);
        assert_eq!(stopped.mark, None);
        assert_eq!(stopped.resume_point, None);
    }

    #[tokio::test]
    async fn disabling_repeat_mid_pass_lets_the_pass_complete() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        controller.toggle_repeat();
        let runner = spawn_play(&controller);

        assert_eq!(started.recv().await.as_deref(), Some("A1."));
        assert!(!controller.toggle_repeat());
        speech.release(10);
        assert_eq!(runner.await.expect("join"), Ok(PlayOutcome::Completed));
        assert_eq!(speech.spoken().len(), 5);
    }

    #[tokio::test]
    async fn refuses_to_play_without_voice_or_text() {
        let (speech, _started) = ScriptedSpeech::auto();
        let speech = Arc::new(speech);
        let controller = PlaybackController::new(Arc::clone(&speech), settings());
        controller.load(three_two(), 0);
        assert_eq!(
            controller.play(None).await,
            Err(PlaybackError::VoiceNotSelected)
        );

        controller.set_voice(Some(voice("en-US-1")));
        controller.load(paginate(" \n\n "), 0);
        assert_eq!(controller.play(None).await, Err(PlaybackError::EmptyDocument));
        assert!(speech.spoken().is_empty());
        assert_eq!(controller.snapshot().state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn explicit_start_out_of_range_is_rejected() {
        let (speech, _started) = ScriptedSpeech::auto();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        assert_eq!(
            controller.play(Some(Cursor::new(1, 2))).await,
            Err(PlaybackError::PhraseOutOfRange { page: 1, phrase: 2 })
        );
        assert_eq!(
            controller.play(Some(Cursor::new(0, 2))).await,
            Ok(PlayOutcome::Completed)
        );
        assert_eq!(speech.spoken(), vec!["A3.", "B1.", "B2."]);
    }

    #[tokio::test]
    async fn jump_is_rejected_while_playing_and_out_of_range() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        let runner = spawn_play(&controller);

        assert_eq!(started.recv().await.as_deref(), Some("A1."));
        assert_eq!(controller.jump_to_page(2), Err(PlaybackError::Busy));
        assert!(controller.pause());
        assert_eq!(runner.await.expect("join"), Ok(PlayOutcome::Cancelled));

        assert_eq!(
            controller.jump_to_page(3),
            Err(PlaybackError::PageOutOfRange {
                requested: 3,
                total: 2
            })
        );
        assert_eq!(
            controller.jump_to_page(0),
            Err(PlaybackError::PageOutOfRange {
                requested: 0,
                total: 2
            })
        );

        controller.jump_to_page(2).expect("page 2 exists");
        let jumped = controller.snapshot();
        assert_eq!(jumped.cursor, Cursor::new(1, 0));
        assert_eq!(jumped.state, PlaybackState::Idle);
        assert_eq!(jumped.mark, None);

        speech.release(10);
        assert_eq!(controller.play(None).await, Ok(PlayOutcome::Completed));
        assert_eq!(speech.spoken()[1..], ["B1.", "B2."]);
    }

    #[tokio::test]
    async fn speech_failure_abandons_the_run() {
        let (speech, _started) = ScriptedSpeech::auto();
        let speech = Arc::new(speech);
        speech.fail_on("A2.");
        let controller = controller(&speech);

        let outcome = controller.play(None).await;
        assert!(matches!(
            outcome,
            Err(PlaybackError::Speech(SpeechError::Failed(_)))
        ));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.mark, None);
    }

    #[tokio::test]
    async fn new_play_supersedes_running_one() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        let first = spawn_play(&controller);
        assert_eq!(started.recv().await.as_deref(), Some("A1."));

        let second = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.play(Some(Cursor::new(1, 1))).await })
        };
        assert_eq!(first.await.expect("join"), Ok(PlayOutcome::Cancelled));
        assert_eq!(started.recv().await.as_deref(), Some("B2."));
        speech.release(1);
        assert_eq!(second.await.expect("join"), Ok(PlayOutcome::Completed));
    }

    #[tokio::test]
    async fn reload_abandons_run_and_clamps_initial_page() {
        let (speech, mut started) = ScriptedSpeech::gated();
        let speech = Arc::new(speech);
        let controller = controller(&speech);
        let runner = spawn_play(&controller);
        assert_eq!(started.recv().await.as_deref(), Some("A1."));

        controller.load(paginate("Only page."), 4);
        assert_eq!(runner.await.expect("join"), Ok(PlayOutcome::Cancelled));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.page_count, 1);
        assert_eq!(snapshot.cursor, Cursor::new(0, 0));
        assert_eq!(snapshot.state, PlaybackState::Idle);
    }
}
