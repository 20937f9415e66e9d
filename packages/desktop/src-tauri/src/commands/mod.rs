pub mod app;
pub mod logs;
pub mod navigation;

use log::warn;
use tauri::{Runtime, Webview};

use crate::{permissions::BridgeChannel, DesktopRuntime};

/// Rejects bridge calls from pages the channel is not open to.
pub(crate) fn authorize<R: Runtime>(
    runtime: &DesktopRuntime,
    webview: &Webview<R>,
    channel: BridgeChannel,
) -> Result<(), String> {
    let caller = webview
        .url()
        .map_err(|err| format!("Failed to resolve caller: {err}"))?;
    if runtime.coordinator().permits(channel, &caller) {
        Ok(())
    } else {
        warn!(
            "[desktop:bridge] Denied {} for {}",
            channel.name(),
            caller.origin().ascii_serialization()
        );
        Err(format!("{} is not available on this page", channel.name()))
    }
}
