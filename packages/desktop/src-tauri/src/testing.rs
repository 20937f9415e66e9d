//! Fakes shared by the unit tests.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use url::Url;

use crate::{logging::ErrorSink, navigation::NavigationState, window::AppWindow};

#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn suppressed(&self, area: &str, message: &str) {
        self.entries
            .lock()
            .push((area.to_string(), message.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCall {
    Restore,
    Focus,
    Reveal,
    Conceal,
    Load(String),
    Reload,
    Back,
}

#[derive(Default)]
struct FakeWindowState {
    destroyed: bool,
    failing: bool,
    minimized: bool,
    calls: Vec<WindowCall>,
    published: Vec<NavigationState>,
}

#[derive(Clone, Default)]
pub struct FakeWindow {
    state: Arc<Mutex<FakeWindowState>>,
}

impl FakeWindow {
    pub fn set_minimized(&self, minimized: bool) {
        self.state.lock().minimized = minimized;
    }

    /// Makes every later window operation fail while the window stays alive.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn destroy(&self) {
        self.state.lock().destroyed = true;
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        self.state.lock().calls.clone()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                WindowCall::Load(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self) -> Vec<NavigationState> {
        self.state.lock().published.clone()
    }

    fn record(&self, call: WindowCall) -> Result<()> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(anyhow!("window destroyed"));
        }
        if state.failing {
            return Err(anyhow!("window operation failed"));
        }
        state.calls.push(call);
        Ok(())
    }
}

impl AppWindow for FakeWindow {
    fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    fn minimized(&self) -> bool {
        self.state.lock().minimized
    }

    fn restore(&self) -> Result<()> {
        self.state.lock().minimized = false;
        self.record(WindowCall::Restore)
    }

    fn focus(&self) -> Result<()> {
        self.record(WindowCall::Focus)
    }

    fn reveal(&self) -> Result<()> {
        self.record(WindowCall::Reveal)
    }

    fn conceal(&self) -> Result<()> {
        self.record(WindowCall::Conceal)
    }

    fn load_url(&self, url: &Url) -> Result<()> {
        self.record(WindowCall::Load(url.to_string()))
    }

    fn reload_page(&self) -> Result<()> {
        self.record(WindowCall::Reload)
    }

    fn history_back(&self) -> Result<()> {
        self.record(WindowCall::Back)
    }

    fn publish_navigation_state(&self, state: NavigationState) -> Result<()> {
        self.state.lock().published.push(state);
        Ok(())
    }
}
