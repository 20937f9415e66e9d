use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use tauri::{AppHandle, State, Webview};

use crate::{commands::authorize, permissions::BridgeChannel, DesktopRuntime};

const ICON_PNG: &[u8] = include_bytes!("../../icons/icon.png");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Branding {
    name: String,
    icon_data_url: String,
}

fn icon_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

#[tauri::command]
pub fn get_app_version(
    app: AppHandle,
    webview: Webview,
    state: State<'_, DesktopRuntime>,
) -> Result<String, String> {
    authorize(&state, &webview, BridgeChannel::GetAppVersion)?;
    Ok(app.package_info().version.to_string())
}

#[tauri::command]
pub fn get_branding(
    app: AppHandle,
    webview: Webview,
    state: State<'_, DesktopRuntime>,
) -> Result<Branding, String> {
    authorize(&state, &webview, BridgeChannel::GetBranding)?;
    let name = app
        .config()
        .product_name
        .clone()
        .unwrap_or_else(|| app.package_info().name.clone());
    Ok(Branding {
        name,
        icon_data_url: icon_data_url(ICON_PNG),
    })
}

/// Reloads the configured start URL, typically from the offline page.
#[tauri::command]
pub fn retry_app_load(webview: Webview, state: State<'_, DesktopRuntime>) -> Result<bool, String> {
    authorize(&state, &webview, BridgeChannel::RetryAppLoad)?;
    let loaded = state.coordinator().retry_load();
    if loaded {
        state.check_start_url();
    }
    Ok(loaded)
}
