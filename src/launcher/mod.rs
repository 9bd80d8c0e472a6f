//! Dev launcher: runs the backend and the frontend dev server side by side.

mod process;

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::Context;

use crate::core::config::LauncherSettings;
use crate::core::shutdown;

use process::{CommandSpec, ManagedChild};

const BACKEND_BIN: &str = "grader-backend";
const API_BASE_VAR: &str = "NEXT_PUBLIC_API_BASE";

pub(crate) async fn run(settings: LauncherSettings) -> anyhow::Result<()> {
    ensure_frontend_dependencies(&settings.frontend_dir).await?;

    let current_exe = std::env::current_exe().context("failed to locate launcher executable")?;
    let backend_spec = backend_command(&settings, &current_exe);
    let frontend_spec = frontend_command(&settings, std::env::var(API_BASE_VAR).ok());

    tracing::info!(
        host = %settings.backend_host,
        port = settings.backend_port,
        reload = settings.backend_reload,
        "Starting backend"
    );
    let mut backend = ManagedChild::spawn("backend", &backend_spec)?;

    tracing::info!(url = %format!("http://localhost:{}", settings.frontend_port), "Starting frontend");
    let mut frontend = match ManagedChild::spawn("frontend", &frontend_spec) {
        Ok(child) => child,
        Err(err) => {
            backend.interrupt();
            backend.wait_or_kill(settings.shutdown_grace).await;
            return Err(err);
        }
    };

    tokio::select! {
        status = backend.wait() => log_exit("backend", status),
        status = frontend.wait() => log_exit("frontend", status),
        signal = shutdown::wait_for_signal() => {
            tracing::info!(signal = signal.as_str(), "Shutting down launcher");
        }
    }

    let mut children = [backend, frontend];
    for child in children.iter_mut() {
        child.interrupt();
    }
    for child in children.iter_mut() {
        child.wait_or_kill(settings.shutdown_grace).await;
    }

    tracing::info!("All processes stopped");
    Ok(())
}

fn log_exit(name: &str, status: std::io::Result<ExitStatus>) {
    match status {
        Ok(status) => tracing::info!(process = name, code = ?status.code(), "Process exited"),
        Err(err) => tracing::error!(process = name, error = %err, "Failed to wait for process"),
    }
}

/// Runs `npm install` when `node_modules` is missing; a failed install aborts start-up.
async fn ensure_frontend_dependencies(frontend_dir: &Path) -> anyhow::Result<()> {
    if frontend_dir.join("node_modules").exists() {
        return Ok(());
    }

    tracing::info!(dir = %frontend_dir.display(), "node_modules not found; running npm install");
    let status = CommandSpec::new("npm").args(["install"]).current_dir(frontend_dir).status().await?;
    if !status.success() {
        anyhow::bail!(
            "`npm install` failed with exit code {} in {}",
            status.code().map_or_else(|| "unknown".to_string(), |code| code.to_string()),
            frontend_dir.display()
        );
    }

    tracing::info!("npm install complete");
    Ok(())
}

/// With reload on the backend is rebuilt from source; otherwise the sibling binary runs.
fn backend_command(settings: &LauncherSettings, current_exe: &Path) -> CommandSpec {
    let spec = if settings.backend_reload {
        CommandSpec::new("cargo").args(["run", "--bin", BACKEND_BIN])
    } else {
        CommandSpec::new(sibling_binary(current_exe, BACKEND_BIN))
    };

    spec.env("GRADER_BACKEND_HOST", settings.backend_host.clone())
        .env("GRADER_BACKEND_PORT", settings.backend_port.to_string())
}

fn sibling_binary(current_exe: &Path, name: &str) -> PathBuf {
    current_exe.with_file_name(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

fn frontend_command(settings: &LauncherSettings, api_base: Option<String>) -> CommandSpec {
    let api_base = api_base
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("http://localhost:{}", settings.backend_port));

    CommandSpec::new("npm")
        .args(["run", "dev", "--", "--port"])
        .args([settings.frontend_port.to_string()])
        .current_dir(&settings.frontend_dir)
        .env(API_BASE_VAR, api_base)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::config::TelemetrySettings;

    fn launcher_settings(reload: bool) -> LauncherSettings {
        LauncherSettings {
            backend_host: "0.0.0.0".to_string(),
            backend_port: 8100,
            backend_reload: reload,
            frontend_port: 3100,
            frontend_dir: PathBuf::from("grader_frontend"),
            shutdown_grace: Duration::from_secs(5),
            telemetry: TelemetrySettings {
                log_level: "info".to_string(),
                json: false,
                prometheus_enabled: false,
            },
        }
    }

    #[test]
    fn reload_runs_backend_through_cargo() {
        let spec = backend_command(&launcher_settings(true), Path::new("/opt/bin/grader-launcher"));

        assert_eq!(spec.program, PathBuf::from("cargo"));
        assert_eq!(spec.args, vec!["run", "--bin", "grader-backend"]);
        assert!(spec.env.contains(&("GRADER_BACKEND_PORT".to_string(), "8100".to_string())));
        assert!(spec.env.contains(&("GRADER_BACKEND_HOST".to_string(), "0.0.0.0".to_string())));
    }

    #[test]
    fn without_reload_backend_is_the_sibling_binary() {
        let spec =
            backend_command(&launcher_settings(false), Path::new("/opt/bin/grader-launcher"));

        let expected = format!("/opt/bin/grader-backend{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(spec.program, PathBuf::from(expected));
        assert!(spec.args.is_empty());
    }

    #[test]
    fn frontend_points_at_backend_port_by_default() {
        let spec = frontend_command(&launcher_settings(true), None);

        assert_eq!(spec.program, PathBuf::from("npm"));
        assert_eq!(spec.args, vec!["run", "dev", "--", "--port", "3100"]);
        assert_eq!(spec.cwd, Some(PathBuf::from("grader_frontend")));
        assert_eq!(
            spec.env,
            vec![(API_BASE_VAR.to_string(), "http://localhost:8100".to_string())]
        );
    }

    #[test]
    fn existing_api_base_is_kept() {
        let spec = frontend_command(
            &launcher_settings(true),
            Some("https://grader.example.edu".to_string()),
        );

        assert_eq!(
            spec.env,
            vec![(API_BASE_VAR.to_string(), "https://grader.example.edu".to_string())]
        );
    }

    #[tokio::test]
    async fn installed_frontend_skips_npm_install() {
        let dir = std::env::temp_dir().join(format!("grader-launcher-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("node_modules")).expect("create node_modules");

        let result = ensure_frontend_dependencies(&dir).await;
        let _ = std::fs::remove_dir_all(&dir);

        assert!(result.is_ok());
    }
}
