use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use log::{debug, info};
use parking_lot::Mutex;
use tauri::{AppHandle, Runtime, WebviewWindow};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use tauri_plugin_updater::{Update, UpdaterExt};
use tokio::sync::oneshot;

use crate::{coordinator::DesktopCoordinator, logging::ErrorSink};

pub const CHECK_FOR_UPDATES_EVENT: &str = "vertex:check-for-updates";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    UpdateAvailable { version: String },
    Downloading { version: String },
    UpdateReady { version: String },
    Installed { version: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    CheckStarted,
    NoUpdate,
    Found { version: String },
    CheckFailed { message: String },
    DownloadAccepted,
    Downloaded,
    DownloadFailed { message: String },
    InstallAccepted,
    InstallFailed { message: String },
    /// The user said "Later", or there was no window to ask.
    Deferred,
    /// Error logged; back to waiting for the next trigger.
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: UpdateState,
    pub event: UpdateEvent,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot apply {:?} in state {:?}", self.event, self.from)
    }
}

impl std::error::Error for InvalidTransition {}

impl UpdateState {
    pub fn apply(&self, event: UpdateEvent) -> Result<UpdateState, InvalidTransition> {
        use UpdateEvent as E;
        use UpdateState as S;

        let next = match (self, &event) {
            (S::Idle, E::CheckStarted) => S::Checking,
            (S::Checking, E::NoUpdate) => S::Idle,
            (S::Checking, E::Found { version }) => S::UpdateAvailable {
                version: version.clone(),
            },
            (S::Checking, E::CheckFailed { message }) => S::Error {
                message: message.clone(),
            },
            (S::UpdateAvailable { version }, E::DownloadAccepted) => S::Downloading {
                version: version.clone(),
            },
            (S::UpdateAvailable { .. }, E::Deferred) => S::Idle,
            (S::Downloading { version }, E::Downloaded) => S::UpdateReady {
                version: version.clone(),
            },
            (S::Downloading { .. }, E::DownloadFailed { message }) => S::Error {
                message: message.clone(),
            },
            (S::UpdateReady { version }, E::InstallAccepted) => S::Installed {
                version: version.clone(),
            },
            (S::UpdateReady { .. }, E::Deferred) => S::Idle,
            (S::Installed { .. }, E::InstallFailed { message }) => S::Error {
                message: message.clone(),
            },
            (S::Error { .. }, E::Settled) => S::Idle,
            _ => {
                return Err(InvalidTransition {
                    from: self.clone(),
                    event,
                })
            }
        };
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePrompt {
    Download { version: String },
    Restart { version: String },
}

impl UpdatePrompt {
    pub fn title(&self) -> &'static str {
        match self {
            UpdatePrompt::Download { .. } => "Update available",
            UpdatePrompt::Restart { .. } => "Update ready",
        }
    }

    pub fn message(&self) -> String {
        match self {
            UpdatePrompt::Download { version } => {
                format!("Version {version} is available. Download now?")
            }
            UpdatePrompt::Restart { version } => {
                format!("Version {version} has been downloaded. Restart to install?")
            }
        }
    }

    pub fn confirm_label(&self) -> &'static str {
        match self {
            UpdatePrompt::Download { .. } => "Download now",
            UpdatePrompt::Restart { .. } => "Restart",
        }
    }

    pub fn cancel_label(&self) -> &'static str {
        "Later"
    }
}

/// Remote release feed plus the local install step.
pub trait UpdateFeed: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = Result<Option<AvailableUpdate>>> + Send;
    /// Downloads the release found by the last `check`.
    fn download(&self) -> impl Future<Output = Result<()>> + Send;
    fn install(&self) -> Result<()>;
    /// Drops any release held from the last `check`.
    fn discard(&self);
    fn relaunch(&self);
}

pub trait UpdatePrompter: Send + Sync + 'static {
    fn has_active_window(&self) -> bool;
    fn confirm(&self, prompt: UpdatePrompt) -> impl Future<Output = bool> + Send;
}

pub struct UpdateCoordinator<F: UpdateFeed, P: UpdatePrompter> {
    feed: F,
    prompter: P,
    state: Mutex<UpdateState>,
    configured: AtomicBool,
    sink: Arc<dyn ErrorSink>,
}

impl<F: UpdateFeed, P: UpdatePrompter> UpdateCoordinator<F, P> {
    pub fn new(feed: F, prompter: P, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            feed,
            prompter,
            state: Mutex::new(UpdateState::Idle),
            configured: AtomicBool::new(false),
            sink,
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state.lock().clone()
    }

    /// Runs `subscribe` the first time only, so triggers are never wired twice.
    pub fn wire<S: FnOnce()>(&self, subscribe: S) -> bool {
        if self.configured.swap(true, Ordering::SeqCst) {
            return false;
        }
        subscribe();
        true
    }

    fn advance(&self, event: UpdateEvent) -> bool {
        let mut state = self.state.lock();
        match state.apply(event) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(err) => {
                self.sink.suppressed("updater", &err.to_string());
                false
            }
        }
    }

    fn fail(&self, event: UpdateEvent, message: &str) {
        self.sink.suppressed("updater", message);
        self.feed.discard();
        if self.advance(event) {
            self.advance(UpdateEvent::Settled);
        }
    }

    fn defer(&self) {
        self.feed.discard();
        self.advance(UpdateEvent::Deferred);
    }

    /// One full check cycle. Failures are logged through the sink and never
    /// returned; the final state is handed back for callers that care.
    pub async fn run_check(&self) -> UpdateState {
        {
            let mut state = self.state.lock();
            match state.apply(UpdateEvent::CheckStarted) {
                Ok(next) => *state = next,
                Err(_) => {
                    info!("[desktop:updater] Check skipped while {:?}", *state);
                    return state.clone();
                }
            }
        }

        let update = match self.feed.check().await {
            Ok(Some(update)) => update,
            Ok(None) => {
                info!("[desktop:updater] No update available");
                self.advance(UpdateEvent::NoUpdate);
                return self.state();
            }
            Err(err) => {
                let message = format!("Update check failed: {err}");
                self.fail(UpdateEvent::CheckFailed { message: message.clone() }, &message);
                return self.state();
            }
        };

        let version = update.version.clone();
        info!("[desktop:updater] Update {} available", version);
        self.advance(UpdateEvent::Found {
            version: version.clone(),
        });

        if !self.prompter.has_active_window() {
            info!("[desktop:updater] No window to prompt; deferring {}", version);
            self.defer();
            return self.state();
        }

        let accepted = self
            .prompter
            .confirm(UpdatePrompt::Download {
                version: version.clone(),
            })
            .await;
        if !accepted {
            self.defer();
            return self.state();
        }

        self.advance(UpdateEvent::DownloadAccepted);
        if let Err(err) = self.feed.download().await {
            let message = format!("Update download failed: {err}");
            self.fail(UpdateEvent::DownloadFailed { message: message.clone() }, &message);
            return self.state();
        }
        self.advance(UpdateEvent::Downloaded);

        let restart = self
            .prompter
            .confirm(UpdatePrompt::Restart {
                version: version.clone(),
            })
            .await;
        if !restart {
            self.defer();
            return self.state();
        }

        self.advance(UpdateEvent::InstallAccepted);
        if let Err(err) = self.feed.install() {
            let message = format!("Update install failed: {err}");
            self.fail(UpdateEvent::InstallFailed { message: message.clone() }, &message);
            return self.state();
        }
        info!("[desktop:updater] Installed {}, relaunching", version);
        self.feed.relaunch();
        self.state()
    }
}

struct PendingUpdate {
    update: Update,
    bytes: Option<Vec<u8>>,
}

/// Release feed backed by `tauri-plugin-updater`.
pub struct TauriUpdateFeed<R: Runtime> {
    app: AppHandle<R>,
    pending: Mutex<Option<PendingUpdate>>,
}

impl<R: Runtime> TauriUpdateFeed<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self {
            app,
            pending: Mutex::new(None),
        }
    }
}

impl<R: Runtime> UpdateFeed for TauriUpdateFeed<R> {
    async fn check(&self) -> Result<Option<AvailableUpdate>> {
        let found = self.app.updater()?.check().await?;
        let available = found.as_ref().map(|update| AvailableUpdate {
            version: update.version.clone(),
        });
        *self.pending.lock() = found.map(|update| PendingUpdate {
            update,
            bytes: None,
        });
        Ok(available)
    }

    async fn download(&self) -> Result<()> {
        let update = self
            .pending
            .lock()
            .as_ref()
            .map(|pending| pending.update.clone())
            .ok_or_else(|| anyhow!("No pending update"))?;

        let mut downloaded: u64 = 0;
        let bytes = update
            .download(
                |chunk_length, content_length| {
                    downloaded = downloaded.saturating_add(chunk_length as u64);
                    debug!(
                        "[desktop:updater] Downloaded {} of {:?} bytes",
                        downloaded,
                        content_length
                    );
                },
                || info!("[desktop:updater] Download finished"),
            )
            .await?;

        match self.pending.lock().as_mut() {
            Some(pending) => {
                pending.bytes = Some(bytes);
                Ok(())
            }
            None => Err(anyhow!("Pending update was discarded during download")),
        }
    }

    fn install(&self) -> Result<()> {
        let pending = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| anyhow!("No pending update"))?;
        let bytes = pending
            .bytes
            .ok_or_else(|| anyhow!("Update {} was not downloaded", pending.update.version))?;
        pending.update.install(bytes)?;
        Ok(())
    }

    fn discard(&self) {
        self.pending.lock().take();
    }

    fn relaunch(&self) {
        self.app.restart();
    }
}

/// Native confirm dialogs, parented to the main window while it is alive.
pub struct DialogPrompter<R: Runtime> {
    app: AppHandle<R>,
    coordinator: Arc<DesktopCoordinator<WebviewWindow<R>>>,
}

impl<R: Runtime> DialogPrompter<R> {
    pub fn new(app: AppHandle<R>, coordinator: Arc<DesktopCoordinator<WebviewWindow<R>>>) -> Self {
        Self { app, coordinator }
    }
}

impl<R: Runtime> UpdatePrompter for DialogPrompter<R> {
    fn has_active_window(&self) -> bool {
        self.coordinator.active_window().is_some()
    }

    async fn confirm(&self, prompt: UpdatePrompt) -> bool {
        let (tx, rx) = oneshot::channel();
        {
            let mut dialog = self
                .app
                .dialog()
                .message(prompt.message())
                .title(prompt.title())
                .kind(MessageDialogKind::Info)
                .buttons(MessageDialogButtons::OkCancelCustom(
                    prompt.confirm_label().to_string(),
                    prompt.cancel_label().to_string(),
                ));
            if let Some(window) = self.coordinator.active_window() {
                dialog = dialog.parent(&window);
            }
            dialog.show(move |confirmed| {
                let _ = tx.send(confirmed);
            });
        }
        rx.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeFeed {
        check_results: Mutex<VecDeque<Result<Option<AvailableUpdate>>>>,
        download_fails: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeFeed {
        fn with(results: Vec<Result<Option<AvailableUpdate>>>) -> Self {
            Self {
                check_results: Mutex::new(results.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    impl UpdateFeed for FakeFeed {
        async fn check(&self) -> Result<Option<AvailableUpdate>> {
            self.calls.lock().push("check");
            self.check_results
                .lock()
                .pop_front()
                .unwrap_or(Ok(None))
        }

        async fn download(&self) -> Result<()> {
            self.calls.lock().push("download");
            if self.download_fails {
                Err(anyhow!("connection reset"))
            } else {
                Ok(())
            }
        }

        fn install(&self) -> Result<()> {
            self.calls.lock().push("install");
            Ok(())
        }

        fn discard(&self) {
            self.calls.lock().push("discard");
        }

        fn relaunch(&self) {
            self.calls.lock().push("relaunch");
        }
    }

    struct FakePrompter {
        window: bool,
        answers: Mutex<VecDeque<bool>>,
        prompts: Mutex<Vec<UpdatePrompt>>,
    }

    impl FakePrompter {
        fn new(window: bool, answers: &[bool]) -> Self {
            Self {
                window,
                answers: Mutex::new(answers.iter().copied().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl UpdatePrompter for FakePrompter {
        fn has_active_window(&self) -> bool {
            self.window
        }

        async fn confirm(&self, prompt: UpdatePrompt) -> bool {
            self.prompts.lock().push(prompt);
            self.answers.lock().pop_front().unwrap_or(false)
        }
    }

    fn release(version: &str) -> AvailableUpdate {
        AvailableUpdate {
            version: version.to_string(),
        }
    }

    fn coordinator(
        feed: FakeFeed,
        prompter: FakePrompter,
    ) -> (UpdateCoordinator<FakeFeed, FakePrompter>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (UpdateCoordinator::new(feed, prompter, sink.clone()), sink)
    }

    #[test]
    fn transition_table_follows_lifecycle() {
        let v = || "2.0.0".to_string();
        let mut state = UpdateState::Idle;
        for event in [
            UpdateEvent::CheckStarted,
            UpdateEvent::Found { version: v() },
            UpdateEvent::DownloadAccepted,
            UpdateEvent::Downloaded,
            UpdateEvent::InstallAccepted,
        ] {
            state = state.apply(event).unwrap();
        }
        assert_eq!(state, UpdateState::Installed { version: v() });
    }

    #[test]
    fn errors_only_reachable_from_checking_or_downloading() {
        let failure = || UpdateEvent::CheckFailed {
            message: "offline".to_string(),
        };
        assert!(UpdateState::Checking.apply(failure()).is_ok());
        assert!(UpdateState::Idle.apply(failure()).is_err());

        let downloading = UpdateState::Downloading {
            version: "2.0.0".to_string(),
        };
        let failed = downloading
            .apply(UpdateEvent::DownloadFailed {
                message: "reset".to_string(),
            })
            .unwrap();
        assert_eq!(failed.apply(UpdateEvent::Settled).unwrap(), UpdateState::Idle);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let err = UpdateState::Idle
            .apply(UpdateEvent::Downloaded)
            .unwrap_err();
        assert_eq!(err.from, UpdateState::Idle);
        assert!(err.to_string().contains("Downloaded"));
    }

    #[test]
    fn wiring_happens_once() {
        let (updates, _) = coordinator(FakeFeed::default(), FakePrompter::new(true, &[]));
        let mut subscriptions = 0;
        assert!(updates.wire(|| subscriptions += 1));
        assert!(!updates.wire(|| subscriptions += 1));
        assert_eq!(subscriptions, 1);
    }

    #[tokio::test]
    async fn no_update_returns_to_idle() {
        let (updates, sink) = coordinator(
            FakeFeed::with(vec![Ok(None)]),
            FakePrompter::new(true, &[]),
        );
        assert_eq!(updates.run_check().await, UpdateState::Idle);
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn check_failure_is_logged_and_settles_idle() {
        let (updates, sink) = coordinator(
            FakeFeed::with(vec![Err(anyhow!("dns error"))]),
            FakePrompter::new(true, &[true]),
        );
        assert_eq!(updates.run_check().await, UpdateState::Idle);
        assert_eq!(sink.entries().len(), 1);
        assert!(sink.entries()[0].1.contains("dns error"));
        assert!(updates.prompter.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn accepted_update_downloads_installs_and_relaunches() {
        let (updates, sink) = coordinator(
            FakeFeed::with(vec![Ok(Some(release("2.0.0")))]),
            FakePrompter::new(true, &[true, true]),
        );
        let state = updates.run_check().await;
        assert_eq!(
            state,
            UpdateState::Installed {
                version: "2.0.0".to_string()
            }
        );
        assert_eq!(
            updates.feed.calls(),
            vec!["check", "download", "install", "relaunch"]
        );
        assert_eq!(
            *updates.prompter.prompts.lock(),
            vec![
                UpdatePrompt::Download {
                    version: "2.0.0".to_string()
                },
                UpdatePrompt::Restart {
                    version: "2.0.0".to_string()
                },
            ]
        );
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn declining_download_returns_to_idle() {
        let (updates, _) = coordinator(
            FakeFeed::with(vec![Ok(Some(release("2.0.0")))]),
            FakePrompter::new(true, &[false]),
        );
        assert_eq!(updates.run_check().await, UpdateState::Idle);
        assert_eq!(updates.feed.calls(), vec!["check", "discard"]);
    }

    #[tokio::test]
    async fn declining_restart_prompts_again_on_next_check() {
        let (updates, _) = coordinator(
            FakeFeed::with(vec![Ok(Some(release("2.0.0"))), Ok(Some(release("2.0.0")))]),
            FakePrompter::new(true, &[true, false, true, false]),
        );
        assert_eq!(updates.run_check().await, UpdateState::Idle);
        assert_eq!(updates.run_check().await, UpdateState::Idle);
        assert_eq!(updates.prompter.prompts.lock().len(), 4);
        assert!(!updates.feed.calls().contains(&"install"));
    }

    #[tokio::test]
    async fn no_window_skips_prompt() {
        let (updates, _) = coordinator(
            FakeFeed::with(vec![Ok(Some(release("2.0.0")))]),
            FakePrompter::new(false, &[true]),
        );
        assert_eq!(updates.run_check().await, UpdateState::Idle);
        assert!(updates.prompter.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn download_failure_is_logged_and_settles_idle() {
        let feed = FakeFeed {
            download_fails: true,
            ..FakeFeed::with(vec![Ok(Some(release("2.0.0")))])
        };
        let (updates, sink) = coordinator(feed, FakePrompter::new(true, &[true]));
        assert_eq!(updates.run_check().await, UpdateState::Idle);
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(updates.prompter.prompts.lock().len(), 1);
    }

    #[tokio::test]
    async fn double_wiring_yields_single_prompt_per_update() {
        let (updates, _) = coordinator(
            FakeFeed::with(vec![Ok(Some(release("2.0.0")))]),
            FakePrompter::new(true, &[false]),
        );
        let updates = Arc::new(updates);
        let mut triggers: Vec<Arc<UpdateCoordinator<FakeFeed, FakePrompter>>> = Vec::new();
        for _ in 0..2 {
            updates.wire(|| triggers.push(updates.clone()));
        }
        for trigger in &triggers {
            trigger.run_check().await;
        }
        assert_eq!(triggers.len(), 1);
        assert_eq!(updates.prompter.prompts.lock().len(), 1);
    }
}
