mod commands;
pub mod config;
pub mod coordinator;
pub mod deep_link;
pub mod load_failure;
pub mod logging;
pub mod navigation;
pub mod permissions;
pub mod protocol;
pub mod updater;
pub mod window;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use commands::app::{get_app_version, get_branding, retry_app_load};
use commands::logs::fetch_desktop_logs;
use commands::navigation::{can_go_back, nav_back, nav_reload, report_navigation};
use config::{AppConfig, UpdateConfig};
use coordinator::DesktopCoordinator;
use log::{info, warn};
use logging::{ErrorSink, LogSink};
use protocol::{registration_plan, LaunchContext};
use tauri::{AppHandle, Listener, Manager, WebviewWindow, Wry};
use tauri_plugin_deep_link::DeepLinkExt;
use tauri_plugin_dialog::init as dialog_plugin;
use tauri_plugin_shell::init as shell_plugin;
use updater::{
    DialogPrompter, TauriUpdateFeed, UpdateCoordinator, CHECK_FOR_UPDATES_EVENT,
};
use window::{create_main_window, AppWindow, MAIN_WINDOW_LABEL};

pub type Coordinator = DesktopCoordinator<WebviewWindow>;
pub type DesktopUpdates = UpdateCoordinator<TauriUpdateFeed<Wry>, DialogPrompter<Wry>>;

#[derive(Clone)]
pub(crate) struct DesktopRuntime {
    coordinator: Arc<Coordinator>,
}

impl DesktopRuntime {
    fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    pub(crate) fn coordinator(&self) -> &Coordinator {
        self.coordinator.as_ref()
    }

    /// Checks the start URL in the background and swaps in the offline page
    /// when it is unreachable. Navigations the webview starts itself are
    /// checked from the window's navigation handler.
    pub(crate) fn check_start_url(&self) {
        let start = self.coordinator.config().start_url.clone();
        self.coordinator.spawn_load_check(&start);
    }
}

/// Focuses the main window, recreating it if it is gone.
fn ensure_main_window(app: &AppHandle) {
    let Some(runtime) = app.try_state::<DesktopRuntime>() else {
        return;
    };
    if let Some(window) = runtime.coordinator().active_window() {
        if let Err(err) = window.focus() {
            warn!("[desktop:window] Failed to focus main window: {}", err);
        }
        return;
    }
    match create_main_window(app, &runtime.coordinator) {
        Ok(_) => runtime.check_start_url(),
        Err(err) => warn!("[desktop:window] Failed to recreate main window: {}", err),
    }
}

fn spawn_update_check(updates: Arc<DesktopUpdates>) {
    tauri::async_runtime::spawn(async move {
        updates.run_check().await;
    });
}

fn setup_updates(app: &AppHandle, updates: &Arc<DesktopUpdates>, config: &UpdateConfig) {
    let wired = updates.wire(|| {
        let listener = updates.clone();
        app.listen(CHECK_FOR_UPDATES_EVENT, move |_event| {
            spawn_update_check(listener.clone());
        });

        if config.check_on_startup {
            spawn_update_check(updates.clone());
        }

        if let Some(interval) = config.interval {
            let periodic = updates.clone();
            tauri::async_runtime::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    periodic.run_check().await;
                }
            });
        }
    });

    if wired {
        info!("[desktop:updater] Update triggers wired");
    }
}

pub fn run() {
    let app = tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, argv, _cwd| {
            info!("[desktop:instance] Second launch with {:?}", argv);
            ensure_main_window(app);
            if let Some(runtime) = app.try_state::<DesktopRuntime>() {
                runtime.coordinator().handle_activation(&argv);
            }
        }))
        .plugin(tauri_plugin_deep_link::init())
        .plugin(shell_plugin())
        .plugin(dialog_plugin())
        .plugin(tauri_plugin_updater::Builder::new().build())
        .plugin(logging::log_plugin())
        .setup(|app| {
            let packaged = !tauri::is_dev();
            let config = Arc::new(AppConfig::load(packaged)?);
            info!(
                "[desktop] Starting {} (origin {}, dev mode: {})",
                config.start_url,
                config.app_origin().ascii_serialization(),
                config.dev_mode
            );

            let sink: Arc<dyn ErrorSink> = Arc::new(LogSink);
            let coordinator = Arc::new(Coordinator::new(config.clone(), sink.clone())?);
            let runtime = DesktopRuntime::new(coordinator.clone());
            app.manage(runtime.clone());

            let plan = registration_plan(&config.scheme, packaged, &LaunchContext::current());
            protocol::register(app.handle(), &plan, sink.clone());

            app.add_capability(permissions::app_origin_capability(
                &config.app_origin(),
                MAIN_WINDOW_LABEL,
            ))?;
            create_main_window(app.handle(), &coordinator)?;
            runtime.check_start_url();

            let links = coordinator.clone();
            app.deep_link().on_open_url(move |event| {
                let urls: Vec<String> = event.urls().iter().map(|url| url.to_string()).collect();
                info!("[desktop:deep-link] Received {:?}", urls);
                links.handle_activation(&urls);
            });

            match app.deep_link().get_current() {
                Ok(Some(urls)) => {
                    let urls: Vec<String> = urls.iter().map(|url| url.to_string()).collect();
                    info!("[desktop:deep-link] Launched with {:?}", urls);
                    coordinator.handle_activation(&urls);
                }
                Ok(None) => {}
                Err(err) => sink.suppressed("deep-link", &format!("Failed to read launch links: {err}")),
            }

            let updates: Arc<DesktopUpdates> = Arc::new(UpdateCoordinator::new(
                TauriUpdateFeed::new(app.handle().clone()),
                DialogPrompter::new(app.handle().clone(), coordinator.clone()),
                sink.clone(),
            ));
            app.manage(updates.clone());
            setup_updates(app.handle(), &updates, &config.updates);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_app_version,
            get_branding,
            retry_app_load,
            nav_reload,
            nav_back,
            can_go_back,
            report_navigation,
            fetch_desktop_logs,
        ])
        .on_window_event(|window, event| {
            if window.label() != MAIN_WINDOW_LABEL {
                return;
            }
            match event {
                #[cfg(target_os = "macos")]
                tauri::WindowEvent::CloseRequested { api, .. } => {
                    // The app stays alive in the dock; Reopen shows the window again.
                    api.prevent_close();
                    if let Some(runtime) = window.try_state::<DesktopRuntime>() {
                        runtime.coordinator().hide_window();
                    }
                }
                tauri::WindowEvent::Destroyed => {
                    if let Some(runtime) = window.try_state::<DesktopRuntime>() {
                        runtime.coordinator().detach_window();
                    }
                }
                _ => {}
            }
        })
        .build(tauri::generate_context!())
        .expect("failed to build Tauri application");

    app.run(|_app_handle, _event| {
        #[cfg(target_os = "macos")]
        if let tauri::RunEvent::Reopen {
            has_visible_windows: false,
            ..
        } = _event
        {
            ensure_main_window(_app_handle);
        }
    });
}
