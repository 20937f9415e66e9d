use serde::{Deserialize, Serialize};
use url::Url;

pub const NAVIGATION_STATE_EVENT: &str = "navigation-state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub can_go_back: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationKind {
    /// A full document load finished.
    Load,
    /// `history.pushState`.
    Push,
    /// `history.replaceState`.
    Replace,
    /// `popstate` or `hashchange`, direction unknown. Reporting the current
    /// entry again changes nothing.
    Pop,
}

/// Session history of the main window, rebuilt from the navigation events the
/// webview reports.
#[derive(Debug, Default)]
pub struct NavigationHistory {
    entries: Vec<Url>,
    cursor: usize,
}

impl NavigationHistory {
    pub fn current(&self) -> Option<&Url> {
        self.entries.get(self.cursor)
    }

    pub fn can_go_back(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn state(&self) -> NavigationState {
        NavigationState {
            can_go_back: self.can_go_back(),
        }
    }

    pub fn record(&mut self, kind: NavigationKind, url: Url) -> NavigationState {
        match kind {
            NavigationKind::Load => {
                // Reloads and loads we triggered via `go_back` land on the
                // current entry already.
                if self.current() != Some(&url) {
                    self.push(url);
                }
            }
            NavigationKind::Push => self.push(url),
            NavigationKind::Replace => match self.entries.get_mut(self.cursor) {
                Some(entry) => *entry = url,
                None => self.push(url),
            },
            NavigationKind::Pop => self.pop_to(url),
        }
        self.state()
    }

    /// Moves the cursor back one entry and returns the entry to show.
    pub fn go_back(&mut self) -> Option<Url> {
        if !self.can_go_back() {
            return None;
        }
        self.cursor -= 1;
        self.current().cloned()
    }

    fn push(&mut self, url: Url) {
        if self.entries.is_empty() {
            self.entries.push(url);
            self.cursor = 0;
            return;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(url);
        self.cursor = self.entries.len() - 1;
    }

    fn pop_to(&mut self, url: Url) {
        if self.current() == Some(&url) {
            return;
        }
        if self.cursor > 0 && self.entries.get(self.cursor - 1) == Some(&url) {
            self.cursor -= 1;
        } else if self.entries.get(self.cursor + 1) == Some(&url) {
            self.cursor += 1;
        } else if let Some(position) = self.entries.iter().rposition(|entry| entry == &url) {
            self.cursor = position;
        } else {
            self.push(url);
        }
    }
}
