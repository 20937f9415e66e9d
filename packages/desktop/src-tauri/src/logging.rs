use std::path::PathBuf;

use log::warn;
use tauri_plugin_log::{Target, TargetKind};

#[cfg(target_os = "macos")]
const PLATFORM_LOG_SEGMENTS: &[&str] = &["Library", "Logs", "AirQo Vertex"];
#[cfg(not(target_os = "macos"))]
const PLATFORM_LOG_SEGMENTS: &[&str] = &[".config", "vertex", "logs"];

const LOG_FILE_STEM: &str = "vertex-desktop";

pub fn log_directory() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    for segment in PLATFORM_LOG_SEGMENTS {
        path.push(segment);
    }
    Some(path)
}

pub fn log_file_path() -> Option<PathBuf> {
    let mut dir = log_directory()?;
    dir.push(format!("{LOG_FILE_STEM}.log"));
    Some(dir)
}

pub fn log_plugin<R: tauri::Runtime>() -> tauri::plugin::TauriPlugin<R> {
    let mut builder = tauri_plugin_log::Builder::default()
        .level(log::LevelFilter::Info)
        .clear_targets()
        .target(Target::new(TargetKind::Stdout))
        .target(Target::new(TargetKind::Webview));

    if let Some(dir) = log_directory() {
        builder = builder.target(Target::new(TargetKind::Folder {
            path: dir,
            file_name: Some(LOG_FILE_STEM.into()),
        }));
    }

    builder.build()
}

/// Receives every error the shell deliberately absorbs instead of propagating.
///
/// Production code logs them; tests swap in a recorder so they can assert that
/// a failure was observed without it escaping to the caller.
pub trait ErrorSink: Send + Sync {
    fn suppressed(&self, area: &str, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn suppressed(&self, area: &str, message: &str) {
        warn!("[desktop:{area}] {message}");
    }
}
