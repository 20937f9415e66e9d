use tauri::ipc::CapabilityBuilder;
use url::Origin;

/// Where the page calling into the bridge was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    AppOrigin,
    LocalAsset,
    Blank,
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeChannel {
    GetAppVersion,
    RetryAppLoad,
    GetBranding,
    NavReload,
    NavBack,
    CanGoBack,
    ReportNavigation,
    FetchLogs,
}

impl BridgeChannel {
    pub fn name(self) -> &'static str {
        match self {
            BridgeChannel::GetAppVersion => "get-app-version",
            BridgeChannel::RetryAppLoad => "retry-app-load",
            BridgeChannel::GetBranding => "get-branding",
            BridgeChannel::NavReload => "nav-reload",
            BridgeChannel::NavBack => "nav-back",
            BridgeChannel::CanGoBack => "can-go-back",
            BridgeChannel::ReportNavigation => "report-navigation",
            BridgeChannel::FetchLogs => "fetch-desktop-logs",
        }
    }
}

const LOCAL_ASSET_CHANNELS: &[BridgeChannel] = &[
    BridgeChannel::GetAppVersion,
    BridgeChannel::GetBranding,
    BridgeChannel::RetryAppLoad,
];

/// Static allowlist of bridge channels per page kind.
pub fn permits(channel: BridgeChannel, page: PageKind) -> bool {
    match page {
        PageKind::AppOrigin => true,
        PageKind::LocalAsset => LOCAL_ASSET_CHANNELS.contains(&channel),
        PageKind::Blank | PageKind::Foreign => false,
    }
}

pub const APP_ORIGIN_CAPABILITY: &str = "app-origin";

/// Remote URL pattern covering every page on `origin`.
pub fn remote_url_pattern(origin: &Origin) -> String {
    format!("{}/*", origin.ascii_serialization())
}

/// IPC access for the configured app origin, which may differ from the
/// origins listed in the bundled capability file.
pub fn app_origin_capability(origin: &Origin, window: &str) -> CapabilityBuilder {
    CapabilityBuilder::new(APP_ORIGIN_CAPABILITY)
        .window(window)
        .remote(remote_url_pattern(origin))
        .permission("core:default")
}
