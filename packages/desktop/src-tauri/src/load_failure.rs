use std::{collections::HashSet, error::Error as StdError, io, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Transport-level reasons a main-frame load can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadFailureCode {
    NameNotResolved,
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    ConnectionFailed,
    TimedOut,
    AddressUnreachable,
    InternetDisconnected,
    Tls,
    Other,
}

impl LoadFailureCode {
    pub const NETWORK: &'static [LoadFailureCode] = &[
        LoadFailureCode::NameNotResolved,
        LoadFailureCode::ConnectionRefused,
        LoadFailureCode::ConnectionReset,
        LoadFailureCode::ConnectionAborted,
        LoadFailureCode::ConnectionFailed,
        LoadFailureCode::TimedOut,
        LoadFailureCode::AddressUnreachable,
        LoadFailureCode::InternetDisconnected,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub url: String,
    pub main_frame: bool,
    pub code: LoadFailureCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    ShowOfflinePage,
}

#[derive(Debug, Clone)]
pub struct LoadFailureMonitor {
    recognized: HashSet<LoadFailureCode>,
}

impl LoadFailureMonitor {
    pub fn new(recognized: impl IntoIterator<Item = LoadFailureCode>) -> Self {
        Self {
            recognized: recognized.into_iter().collect(),
        }
    }

    pub fn recognizes(&self, code: LoadFailureCode) -> bool {
        self.recognized.contains(&code)
    }

    /// Decides the recovery for one failure event. Each event is judged on its
    /// own; nothing here schedules a retry.
    pub fn evaluate(&self, failure: &LoadFailure) -> Option<Recovery> {
        if !failure.main_frame {
            return None;
        }
        let is_web = Url::parse(&failure.url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_web || !self.recognizes(failure.code) {
            return None;
        }
        Some(Recovery::ShowOfflinePage)
    }
}

impl Default for LoadFailureMonitor {
    fn default() -> Self {
        Self::new(LoadFailureCode::NETWORK.iter().copied())
    }
}

/// Maps a reqwest transport error onto the failure table.
pub fn classify(error: &reqwest::Error) -> LoadFailureCode {
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionRefused => return LoadFailureCode::ConnectionRefused,
                io::ErrorKind::ConnectionReset => return LoadFailureCode::ConnectionReset,
                io::ErrorKind::ConnectionAborted => return LoadFailureCode::ConnectionAborted,
                io::ErrorKind::TimedOut => return LoadFailureCode::TimedOut,
                io::ErrorKind::AddrNotAvailable => return LoadFailureCode::AddressUnreachable,
                io::ErrorKind::NotConnected => return LoadFailureCode::InternetDisconnected,
                _ => {}
            }
        }
        let text = current.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return LoadFailureCode::NameNotResolved;
        }
        if text.contains("certificate") || text.contains("tls") {
            return LoadFailureCode::Tls;
        }
        source = current.source();
    }

    if error.is_timeout() {
        LoadFailureCode::TimedOut
    } else if error.is_connect() {
        LoadFailureCode::ConnectionFailed
    } else {
        LoadFailureCode::Other
    }
}

/// Issues one GET against `url`. Any HTTP response, whatever its status,
/// means the page is reachable.
pub async fn probe(client: &Client, url: &Url, timeout: Duration) -> Result<(), LoadFailureCode> {
    match client.get(url.clone()).timeout(timeout).send().await {
        Ok(_) => Ok(()),
        Err(err) => Err(classify(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(url: &str, main_frame: bool, code: LoadFailureCode) -> LoadFailure {
        LoadFailure {
            url: url.to_string(),
            main_frame,
            code,
        }
    }

    #[test]
    fn network_failure_on_main_frame_shows_offline_page() {
        let monitor = LoadFailureMonitor::default();
        let event = failure(
            "https://vertex.airqo.net/",
            true,
            LoadFailureCode::NameNotResolved,
        );
        assert_eq!(monitor.evaluate(&event), Some(Recovery::ShowOfflinePage));
    }

    #[test]
    fn repeated_failures_each_yield_one_recovery() {
        let monitor = LoadFailureMonitor::default();
        let event = failure("https://vertex.airqo.net/", true, LoadFailureCode::TimedOut);
        let recoveries: Vec<_> = (0..3).filter_map(|_| monitor.evaluate(&event)).collect();
        assert_eq!(recoveries.len(), 3);
    }

    #[test]
    fn sub_frame_failures_are_ignored() {
        let monitor = LoadFailureMonitor::default();
        let event = failure(
            "https://vertex.airqo.net/embed",
            false,
            LoadFailureCode::ConnectionRefused,
        );
        assert_eq!(monitor.evaluate(&event), None);
    }

    #[test]
    fn non_web_urls_are_ignored() {
        let monitor = LoadFailureMonitor::default();
        for url in ["file:///tmp/offline.html", "tauri://localhost/index.html", "not a url"] {
            let event = failure(url, true, LoadFailureCode::ConnectionRefused);
            assert_eq!(monitor.evaluate(&event), None, "{url}");
        }
    }

    #[test]
    fn unrecognized_codes_fall_through() {
        let monitor = LoadFailureMonitor::default();
        let event = failure("https://vertex.airqo.net/", true, LoadFailureCode::Tls);
        assert_eq!(monitor.evaluate(&event), None);

        let narrowed = LoadFailureMonitor::new([LoadFailureCode::TimedOut]);
        let refused = failure(
            "https://vertex.airqo.net/",
            true,
            LoadFailureCode::ConnectionRefused,
        );
        assert_eq!(narrowed.evaluate(&refused), None);
    }

    #[test]
    fn codes_use_kebab_case_in_config() {
        let parsed: Vec<LoadFailureCode> =
            serde_json::from_str(r#"["name-not-resolved", "internet-disconnected"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                LoadFailureCode::NameNotResolved,
                LoadFailureCode::InternetDisconnected
            ]
        );
    }

    #[tokio::test]
    async fn probe_classifies_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let result = probe(&Client::new(), &url, Duration::from_secs(5)).await;
        assert_eq!(result, Err(LoadFailureCode::ConnectionRefused));
    }
}
