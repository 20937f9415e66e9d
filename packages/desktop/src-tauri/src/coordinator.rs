use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::info;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use url::Url;

use crate::{
    config::AppConfig,
    deep_link::DeepLinkTranslator,
    load_failure::{self, LoadFailure, LoadFailureMonitor, Recovery},
    logging::ErrorSink,
    navigation::{NavigationHistory, NavigationKind, NavigationState},
    permissions::{self, BridgeChannel, PageKind},
    window::{local_asset_url, AppWindow, NavigationDecision, NavigationGuard},
};

/// Process-lifetime state shared by the window, deep-link and recovery
/// handlers. Built once in `setup` and handed out as `Arc`.
pub struct DesktopCoordinator<W: AppWindow> {
    config: Arc<AppConfig>,
    translator: DeepLinkTranslator,
    guard: NavigationGuard,
    monitor: LoadFailureMonitor,
    offline_url: Url,
    history: Mutex<NavigationHistory>,
    active: RwLock<Option<W>>,
    revealed: AtomicBool,
    client: Client,
    /// Main-frame loads with a reachability check in flight.
    checking: Mutex<HashSet<Url>>,
    sink: Arc<dyn ErrorSink>,
}

impl<W: AppWindow> DesktopCoordinator<W> {
    pub fn new(config: Arc<AppConfig>, sink: Arc<dyn ErrorSink>) -> anyhow::Result<Self> {
        let offline_url = local_asset_url(&config.offline_page)?;
        Ok(Self {
            translator: DeepLinkTranslator::new(&config.scheme, config.start_url.clone()),
            guard: NavigationGuard::new(&config.start_url, &offline_url),
            monitor: LoadFailureMonitor::new(config.recognized_load_failures.iter().copied()),
            offline_url,
            history: Mutex::new(NavigationHistory::default()),
            active: RwLock::new(None),
            revealed: AtomicBool::new(false),
            client: Client::builder().build()?,
            checking: Mutex::new(HashSet::new()),
            sink,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn offline_url(&self) -> &Url {
        &self.offline_url
    }

    /// Makes `window` the target for deep links, dialogs and recovery. A new
    /// window starts with fresh history.
    pub fn attach_window(&self, window: W) {
        *self.active.write() = Some(window);
        *self.history.lock() = NavigationHistory::default();
        self.revealed.store(false, Ordering::SeqCst);
    }

    pub fn detach_window(&self) {
        self.active.write().take();
    }

    /// The live main window, if any. A destroyed window is never returned.
    pub fn active_window(&self) -> Option<W> {
        self.active
            .read()
            .as_ref()
            .filter(|window| !window.is_destroyed())
            .cloned()
    }

    pub fn reveal_once(&self) {
        if self.revealed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(window) = self.active_window() {
            if let Err(err) = window.reveal() {
                self.sink
                    .suppressed("window", &format!("Failed to show main window: {err}"));
            }
        }
    }

    /// Hides the main window without destroying it.
    pub fn hide_window(&self) -> bool {
        let Some(window) = self.active_window() else {
            return false;
        };
        match window.conceal() {
            Ok(()) => true,
            Err(err) => {
                self.sink
                    .suppressed("window", &format!("Failed to hide main window: {err}"));
                false
            }
        }
    }

    pub fn decide_navigation(&self, url: &Url) -> NavigationDecision {
        self.guard.decide(url)
    }

    pub fn page_kind(&self, url: &Url) -> PageKind {
        self.guard.page_kind(url)
    }

    pub fn permits(&self, channel: BridgeChannel, caller: &Url) -> bool {
        permissions::permits(channel, self.page_kind(caller))
    }

    /// Loads `url` in the main window; failures go to the sink.
    fn load(&self, url: &Url, area: &str) -> bool {
        let Some(window) = self.active_window() else {
            self.sink
                .suppressed(area, &format!("No main window to load {url}"));
            return false;
        };
        match window.load_url(url) {
            Ok(()) => true,
            Err(err) => {
                self.sink
                    .suppressed(area, &format!("Failed to load {url}: {err}"));
                false
            }
        }
    }

    /// Translates `raw` and loads the result in the existing window. Returns
    /// whether a navigation was issued.
    pub fn open_deep_link(&self, raw: &str) -> bool {
        let Some(target) = self.translator.translate_or_ignore(raw, self.sink.as_ref()) else {
            return false;
        };
        info!("[desktop:deep-link] Opening {}", target);
        self.load(&target, "deep-link")
    }

    /// Brings the window forward and opens the first deep link in `args`.
    /// Used for second launches and for OS open-url events alike.
    pub fn handle_activation(&self, argv: &[String]) -> bool {
        if let Some(window) = self.active_window() {
            if window.minimized() {
                if let Err(err) = window.restore() {
                    self.sink
                        .suppressed("instance", &format!("Failed to restore window: {err}"));
                }
            }
            if let Err(err) = window.focus() {
                self.sink
                    .suppressed("instance", &format!("Failed to focus window: {err}"));
            }
        }

        match self.translator.find_in_args(argv) {
            Some(link) => self.open_deep_link(link),
            None => false,
        }
    }

    /// Swaps in the offline page for a recognized network failure. Returns
    /// whether the substitution happened.
    pub fn handle_load_failure(&self, failure: &LoadFailure) -> bool {
        match self.monitor.evaluate(failure) {
            Some(Recovery::ShowOfflinePage) => {
                info!(
                    "[desktop:load-failure] {:?} loading {}, showing offline page",
                    failure.code, failure.url
                );
                self.load(&self.offline_url, "load-failure")
            }
            None => false,
        }
    }

    /// Claims a reachability check for a main-frame load of `url`. Only app
    /// pages are checked, and a URL already being checked is skipped.
    pub fn begin_load_check(&self, url: &Url) -> Option<Url> {
        if !matches!(url.scheme(), "http" | "https") || self.page_kind(url) != PageKind::AppOrigin {
            return None;
        }
        let mut target = url.clone();
        target.set_fragment(None);
        self.checking.lock().insert(target.clone()).then_some(target)
    }

    /// Probes `url` and swaps in the offline page when the load cannot
    /// succeed. Returns whether the offline page was loaded.
    pub async fn verify_load(&self, url: Url) -> bool {
        let outcome = load_failure::probe(&self.client, &url, self.config.probe_timeout).await;
        self.checking.lock().remove(&url);
        match outcome {
            Ok(()) => false,
            Err(code) => self.handle_load_failure(&LoadFailure {
                url: url.to_string(),
                main_frame: true,
                code,
            }),
        }
    }

    /// Runs [`Self::verify_load`] in the background for a main-frame load.
    pub fn spawn_load_check(self: &Arc<Self>, url: &Url) {
        let Some(target) = self.begin_load_check(url) else {
            return;
        };
        let coordinator = self.clone();
        tauri::async_runtime::spawn(async move {
            coordinator.verify_load(target).await;
        });
    }

    pub fn retry_load(&self) -> bool {
        self.load(&self.config.start_url, "retry")
    }

    pub fn record_navigation(&self, kind: NavigationKind, url: Url) -> NavigationState {
        let state = self.history.lock().record(kind, url);
        self.publish(state);
        state
    }

    pub fn navigation_state(&self) -> NavigationState {
        self.history.lock().state()
    }

    pub fn go_back(&self) -> bool {
        let Some(window) = self.active_window() else {
            return false;
        };
        let Some(target) = self.history.lock().go_back() else {
            return false;
        };
        if let Err(err) = window.history_back() {
            self.sink
                .suppressed("navigation", &format!("Failed to go back to {target}: {err}"));
            return false;
        }
        self.publish(self.navigation_state());
        true
    }

    pub fn reload(&self) -> bool {
        let Some(window) = self.active_window() else {
            return false;
        };
        match window.reload_page() {
            Ok(()) => true,
            Err(err) => {
                self.sink
                    .suppressed("navigation", &format!("Failed to reload: {err}"));
                false
            }
        }
    }

    fn publish(&self, state: NavigationState) {
        if let Some(window) = self.active_window() {
            if let Err(err) = window.publish_navigation_state(state) {
                self.sink.suppressed(
                    "navigation",
                    &format!("Failed to publish navigation state: {err}"),
                );
            }
        }
    }
}
