use tauri::{State, Webview};
use url::Url;

use crate::{
    commands::authorize,
    navigation::{NavigationKind, NavigationState},
    permissions::BridgeChannel,
    DesktopRuntime,
};

#[tauri::command]
pub fn nav_reload(webview: Webview, state: State<'_, DesktopRuntime>) -> Result<bool, String> {
    authorize(&state, &webview, BridgeChannel::NavReload)?;
    Ok(state.coordinator().reload())
}

/// Goes back one entry; `false` when there is nothing to go back to.
#[tauri::command]
pub fn nav_back(webview: Webview, state: State<'_, DesktopRuntime>) -> Result<bool, String> {
    authorize(&state, &webview, BridgeChannel::NavBack)?;
    Ok(state.coordinator().go_back())
}

#[tauri::command]
pub fn can_go_back(webview: Webview, state: State<'_, DesktopRuntime>) -> Result<bool, String> {
    authorize(&state, &webview, BridgeChannel::CanGoBack)?;
    Ok(state.coordinator().navigation_state().can_go_back)
}

/// Same-document navigations reported by the bridge script.
#[tauri::command]
pub fn report_navigation(
    kind: NavigationKind,
    url: String,
    webview: Webview,
    state: State<'_, DesktopRuntime>,
) -> Result<NavigationState, String> {
    authorize(&state, &webview, BridgeChannel::ReportNavigation)?;
    let url = Url::parse(&url).map_err(|err| format!("Invalid navigation URL: {err}"))?;
    Ok(state.coordinator().record_navigation(kind, url))
}
