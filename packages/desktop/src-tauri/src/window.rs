use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use tauri::{
    webview::{NewWindowResponse, PageLoadEvent},
    AppHandle, Emitter, Manager, Runtime, WebviewUrl, WebviewWindow, WebviewWindowBuilder,
};
use url::Url;

use crate::{
    coordinator::DesktopCoordinator,
    navigation::{NavigationKind, NavigationState, NAVIGATION_STATE_EVENT},
    permissions::PageKind,
};

pub const MAIN_WINDOW_LABEL: &str = "main";

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

#[cfg(windows)]
const LOCAL_ASSET_BASE: &str = "http://tauri.localhost/";
#[cfg(not(windows))]
const LOCAL_ASSET_BASE: &str = "tauri://localhost/";

/// URL of a file bundled with the app's frontend assets.
pub fn local_asset_url(path: &str) -> Result<Url> {
    Ok(Url::parse(LOCAL_ASSET_BASE)?.join(path.trim_start_matches('/'))?)
}

/// The window operations the coordinator drives.
pub trait AppWindow: Clone + Send + Sync + 'static {
    fn is_destroyed(&self) -> bool;
    fn minimized(&self) -> bool;
    fn restore(&self) -> Result<()>;
    fn focus(&self) -> Result<()>;
    fn reveal(&self) -> Result<()>;
    fn conceal(&self) -> Result<()>;
    fn load_url(&self, url: &Url) -> Result<()>;
    fn reload_page(&self) -> Result<()>;
    fn history_back(&self) -> Result<()>;
    fn publish_navigation_state(&self, state: NavigationState) -> Result<()>;
}

impl<R: Runtime> AppWindow for WebviewWindow<R> {
    fn is_destroyed(&self) -> bool {
        self.app_handle().get_webview_window(self.label()).is_none()
    }

    fn minimized(&self) -> bool {
        WebviewWindow::is_minimized(self).unwrap_or(false)
    }

    fn restore(&self) -> Result<()> {
        WebviewWindow::unminimize(self)?;
        Ok(())
    }

    fn focus(&self) -> Result<()> {
        WebviewWindow::show(self)?;
        WebviewWindow::set_focus(self)?;
        Ok(())
    }

    fn reveal(&self) -> Result<()> {
        WebviewWindow::show(self)?;
        Ok(())
    }

    fn conceal(&self) -> Result<()> {
        WebviewWindow::hide(self)?;
        Ok(())
    }

    fn load_url(&self, url: &Url) -> Result<()> {
        WebviewWindow::navigate(self, url.clone())?;
        Ok(())
    }

    fn reload_page(&self) -> Result<()> {
        self.eval("window.location.reload()")?;
        Ok(())
    }

    fn history_back(&self) -> Result<()> {
        self.eval("window.history.back()")?;
        Ok(())
    }

    fn publish_navigation_state(&self, state: NavigationState) -> Result<()> {
        self.emit_to(self.label(), NAVIGATION_STATE_EVENT, state)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    OpenExternally,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SiteOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl SiteOrigin {
    // `tauri://localhost` has an opaque origin in the URL standard, so
    // compare the tuple directly instead of using `Url::origin`.
    fn of(url: &Url) -> Option<Self> {
        Some(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_ascii_lowercase(),
            port: url.port_or_known_default(),
        })
    }
}

/// Keeps the main window on the app origin and the bundled local pages.
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    app: Option<SiteOrigin>,
    local: Option<SiteOrigin>,
}

impl NavigationGuard {
    pub fn new(app_url: &Url, local_asset_url: &Url) -> Self {
        Self {
            app: SiteOrigin::of(app_url),
            local: SiteOrigin::of(local_asset_url),
        }
    }

    pub fn page_kind(&self, url: &Url) -> PageKind {
        if url.as_str() == "about:blank" {
            return PageKind::Blank;
        }
        let origin = SiteOrigin::of(url);
        if origin.is_some() && origin == self.app {
            PageKind::AppOrigin
        } else if origin.is_some() && origin == self.local {
            PageKind::LocalAsset
        } else {
            PageKind::Foreign
        }
    }

    pub fn decide(&self, url: &Url) -> NavigationDecision {
        match self.page_kind(url) {
            PageKind::Foreign => NavigationDecision::OpenExternally,
            _ => NavigationDecision::Allow,
        }
    }
}

pub fn open_externally<R: Runtime>(app: &AppHandle<R>, url: &Url) {
    use tauri_plugin_shell::ShellExt;
    info!("[desktop:window] Opening {} in the system handler", url);
    #[allow(deprecated)]
    {
        if let Err(err) = app.shell().open(url.as_str(), None) {
            warn!("[desktop:window] Failed to open {}: {}", url, err);
        }
    }
}

/// Builds the single main window. It stays hidden until its first page load
/// finishes.
pub fn create_main_window<R: Runtime>(
    app: &AppHandle<R>,
    coordinator: &Arc<DesktopCoordinator<WebviewWindow<R>>>,
) -> tauri::Result<WebviewWindow<R>> {
    let config = coordinator.config();

    let guard = coordinator.clone();
    let navigation_app = app.clone();
    let popup_app = app.clone();
    let loads = coordinator.clone();

    let window = WebviewWindowBuilder::new(
        app,
        MAIN_WINDOW_LABEL,
        WebviewUrl::External(config.start_url.clone()),
    )
    .title(&config.window.title)
    .inner_size(config.window.width, config.window.height)
    .min_inner_size(config.window.min_width, config.window.min_height)
    .visible(false)
    .initialization_script(BRIDGE_SCRIPT)
    .on_navigation(move |url| match guard.decide_navigation(url) {
        NavigationDecision::Allow => {
            guard.spawn_load_check(url);
            true
        }
        NavigationDecision::OpenExternally => {
            open_externally(&navigation_app, url);
            false
        }
    })
    .on_new_window(move |url, _features| {
        open_externally(&popup_app, &url);
        NewWindowResponse::Deny
    })
    .on_page_load(move |_window, payload| {
        if matches!(payload.event(), PageLoadEvent::Finished) {
            loads.record_navigation(NavigationKind::Load, payload.url().clone());
            loads.reveal_once();
        }
    })
    .build()?;

    coordinator.attach_window(window.clone());
    info!(
        "[desktop:window] Main window created for {}",
        config.start_url
    );
    Ok(window)
}
