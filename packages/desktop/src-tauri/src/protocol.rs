use std::{path::PathBuf, sync::Arc};

use log::info;
use tauri::{AppHandle, Runtime};

use crate::logging::ErrorSink;

/// How this process should ask the OS to route `<scheme>://` links to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Packaged {
        scheme: String,
    },
    /// An unbundled binary has to name itself, plus the entry argument it was
    /// started with, for the OS to relaunch it correctly.
    Development {
        scheme: String,
        executable: PathBuf,
        args: Vec<String>,
    },
}

impl Registration {
    pub fn scheme(&self) -> &str {
        match self {
            Registration::Packaged { scheme } | Registration::Development { scheme, .. } => scheme,
        }
    }

    /// `shell\open\command` value for the Windows registry; `%1` is the link.
    pub fn windows_command(&self) -> Option<String> {
        let Registration::Development {
            executable, args, ..
        } = self
        else {
            return None;
        };
        let mut parts = vec![format!("\"{}\"", executable.display())];
        parts.extend(args.iter().map(|arg| format!("\"{arg}\"")));
        parts.push("\"%1\"".to_string());
        Some(parts.join(" "))
    }

    /// XDG desktop entry claiming `x-scheme-handler/<scheme>`; `%u` is the link.
    pub fn desktop_entry(&self) -> Option<String> {
        let Registration::Development {
            scheme,
            executable,
            args,
        } = self
        else {
            return None;
        };
        let mut exec = vec![desktop_quote(&executable.to_string_lossy())];
        exec.extend(args.iter().map(|arg| desktop_quote(arg)));
        exec.push("%u".to_string());
        Some(format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name=AirQo Vertex (development)\n\
             Exec={}\n\
             Terminal=false\n\
             NoDisplay=true\n\
             MimeType=x-scheme-handler/{scheme};\n",
            exec.join(" ")
        ))
    }

    pub fn desktop_file_name(&self) -> String {
        format!("vertex-desktop-dev-{}.desktop", self.scheme())
    }
}

// Exec values are unescaped twice: once as a desktop string, once as a
// quoted argument.
fn desktop_quote(arg: &str) -> String {
    let mut quoted = String::from("\"");
    for ch in arg.chars() {
        match ch {
            '"' | '`' | '$' => {
                quoted.push_str("\\\\");
                quoted.push(ch);
            }
            '\\' => quoted.push_str("\\\\\\\\"),
            '%' => quoted.push_str("%%"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub current_exe: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub argv: Vec<String>,
}

impl LaunchContext {
    pub fn current() -> Self {
        Self {
            current_exe: std::env::current_exe().ok(),
            cwd: std::env::current_dir().ok(),
            argv: std::env::args().collect(),
        }
    }
}

pub fn registration_plan(scheme: &str, packaged: bool, launch: &LaunchContext) -> Registration {
    let executable = match (&launch.current_exe, packaged) {
        (Some(executable), false) => executable.clone(),
        _ => {
            return Registration::Packaged {
                scheme: scheme.to_string(),
            }
        }
    };

    let prefix = format!("{scheme}://");
    let args = launch
        .argv
        .get(1)
        .filter(|arg| !arg.starts_with(&prefix) && !arg.starts_with('-'))
        .map(|arg| {
            let path = PathBuf::from(arg);
            match (&launch.cwd, path.is_relative()) {
                (Some(cwd), true) => cwd.join(path).to_string_lossy().to_string(),
                _ => arg.clone(),
            }
        })
        .into_iter()
        .collect();

    Registration::Development {
        scheme: scheme.to_string(),
        executable,
        args,
    }
}

/// Applies `plan` once. Failures are reported to `sink` and not retried.
pub fn register<R: Runtime>(app: &AppHandle<R>, plan: &Registration, sink: Arc<dyn ErrorSink>) {
    match plan {
        Registration::Packaged { scheme } => register_packaged(app, scheme, sink.as_ref()),
        Registration::Development {
            executable, args, ..
        } => {
            info!(
                "[desktop:protocol] Registering {}:// for {} {:?}",
                plan.scheme(),
                executable.display(),
                args
            );
            let plan = plan.clone();
            tauri::async_runtime::spawn(async move {
                if let Err(err) = register_development(&plan).await {
                    sink.suppressed(
                        "protocol",
                        &format!("Failed to register {}:// for development: {err}", plan.scheme()),
                    );
                }
            });
        }
    }
}

fn register_packaged<R: Runtime>(app: &AppHandle<R>, scheme: &str, sink: &dyn ErrorSink) {
    #[cfg(any(windows, target_os = "linux"))]
    {
        use tauri_plugin_deep_link::DeepLinkExt;
        if let Err(err) = app.deep_link().register(scheme) {
            sink.suppressed("protocol", &format!("Failed to register {scheme}://: {err}"));
        }
    }

    #[cfg(not(any(windows, target_os = "linux")))]
    {
        let _ = (app, sink);
        info!("[desktop:protocol] {scheme}:// is associated through the app bundle");
    }
}

#[cfg(windows)]
async fn register_development(plan: &Registration) -> anyhow::Result<()> {
    use anyhow::Context;

    let command = plan
        .windows_command()
        .context("Not a development registration")?;
    let key = format!(r"HKCU\Software\Classes\{}", plan.scheme());
    let description = format!("URL:{} Protocol", plan.scheme());
    run("reg", &["add", &key, "/ve", "/d", &description, "/f"]).await?;
    run("reg", &["add", &key, "/v", "URL Protocol", "/d", "", "/f"]).await?;
    let command_key = format!(r"{key}\shell\open\command");
    run("reg", &["add", &command_key, "/ve", "/d", &command, "/f"]).await
}

#[cfg(target_os = "linux")]
async fn register_development(plan: &Registration) -> anyhow::Result<()> {
    use anyhow::Context;

    let entry = plan
        .desktop_entry()
        .context("Not a development registration")?;
    let dir = dirs::data_dir()
        .context("No user data directory")?
        .join("applications");
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = plan.desktop_file_name();
    tokio::fs::write(dir.join(&file_name), entry).await?;
    let mime = format!("x-scheme-handler/{}", plan.scheme());
    run("xdg-mime", &["default", &file_name, &mime]).await
}

#[cfg(not(any(windows, target_os = "linux")))]
async fn register_development(plan: &Registration) -> anyhow::Result<()> {
    info!(
        "[desktop:protocol] {}:// needs an app bundle on this platform",
        plan.scheme()
    );
    Ok(())
}

#[cfg(any(windows, target_os = "linux"))]
async fn run(program: &str, args: &[&str]) -> anyhow::Result<()> {
    use anyhow::Context;

    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run {program}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(argv: &[&str]) -> LaunchContext {
        LaunchContext {
            current_exe: Some(PathBuf::from("/work/target/debug/vertex-desktop")),
            cwd: Some(PathBuf::from("/work")),
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn packaged_build_registers_scheme_only() {
        let plan = registration_plan("vertex", true, &launch(&["vertex-desktop", "app"]));
        assert_eq!(
            plan,
            Registration::Packaged {
                scheme: "vertex".to_string()
            }
        );
    }

    #[test]
    fn dev_build_names_executable_and_entry_argument() {
        let plan = registration_plan("vertex", false, &launch(&["vertex-desktop", "dist/entry"]));
        assert_eq!(
            plan,
            Registration::Development {
                scheme: "vertex".to_string(),
                executable: PathBuf::from("/work/target/debug/vertex-desktop"),
                args: vec![PathBuf::from("/work")
                    .join("dist/entry")
                    .to_string_lossy()
                    .to_string()],
            }
        );
    }

    #[test]
    fn dev_build_skips_links_and_flags_as_entry_argument() {
        for argv in [
            vec!["vertex-desktop", "vertex://settings"],
            vec!["vertex-desktop", "--verbose"],
            vec!["vertex-desktop"],
        ] {
            match registration_plan("vertex", false, &launch(&argv)) {
                Registration::Development { args, .. } => assert!(args.is_empty(), "{argv:?}"),
                other => panic!("unexpected plan {other:?}"),
            }
        }
    }

    #[test]
    fn dev_handler_commands_carry_executable_and_entry() {
        let plan = Registration::Development {
            scheme: "vertex".to_string(),
            executable: PathBuf::from("/opt/vertex dev/vertex-desktop"),
            args: vec!["/work/dist/entry".to_string()],
        };
        assert_eq!(
            plan.windows_command().unwrap(),
            r#""/opt/vertex dev/vertex-desktop" "/work/dist/entry" "%1""#
        );

        let entry = plan.desktop_entry().unwrap();
        assert!(entry.starts_with("[Desktop Entry]\n"));
        assert!(entry.contains(
            "\nExec=\"/opt/vertex dev/vertex-desktop\" \"/work/dist/entry\" %u\n"
        ));
        assert!(entry.contains("MimeType=x-scheme-handler/vertex;"));
        assert_eq!(plan.desktop_file_name(), "vertex-desktop-dev-vertex.desktop");
    }

    #[test]
    fn desktop_exec_escapes_reserved_characters() {
        assert_eq!(desktop_quote("50%"), "\"50%%\"");
        assert_eq!(desktop_quote("$HOME"), r#""\\$HOME""#);
        assert_eq!(desktop_quote(r"a\b"), r#""a\\\\b""#);
    }

    #[test]
    fn packaged_plan_has_no_handler_command() {
        let plan = Registration::Packaged {
            scheme: "vertex".to_string(),
        };
        assert!(plan.windows_command().is_none());
        assert!(plan.desktop_entry().is_none());
    }

    #[test]
    fn unknown_executable_falls_back_to_plain_registration() {
        let context = LaunchContext {
            current_exe: None,
            ..launch(&["vertex-desktop"])
        };
        assert_eq!(registration_plan("vertex", false, &context).scheme(), "vertex");
        assert!(matches!(
            registration_plan("vertex", false, &context),
            Registration::Packaged { .. }
        ));
    }
}
