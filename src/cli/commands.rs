//! Subcommand handlers for list-sources, describe and config actions.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use glasscam::config::{default_path, Config, DEFAULT_CONFIG_TEMPLATE};
use glasscam::{
    CaptureError, Coordinator, CoreError, DeviceError, DevicePlatform, DeviceRegistry,
};

use super::args::ConfigAction;

/// How long `describe` waits for the first decodable frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
const FIRST_FRAME_POLL: Duration = Duration::from_millis(200);

/// List available video sources and print them to stdout.
pub async fn list_sources(platform: Arc<dyn DevicePlatform>) -> Result<(), Box<dyn Error>> {
    let registry = DeviceRegistry::new(platform);
    match registry.list_sources().await {
        Ok(catalog) => {
            let default = DeviceRegistry::select_default(&catalog).map(|s| s.id);
            println!("Available video sources:");
            for source in &catalog {
                let marker = if default.as_ref() == Some(&source.id) {
                    "*"
                } else {
                    " "
                };
                println!(" {} {:<24} {}", marker, source.id, source.label());
            }
            println!();
            println!("* = default pick. Use --source <id> to select another.");
            Ok(())
        }
        Err(DeviceError::NoSourcesFound) => {
            println!("No video sources found.");
            println!();
            println!("Make sure your camera is connected and permissions are granted.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Capture one frame, describe it and print the result.
pub async fn describe(coordinator: Coordinator) -> Result<(), Box<dyn Error>> {
    let result = describe_once(&coordinator).await;
    coordinator.shutdown().await;
    let outcome = result?;
    println!("{}", outcome);
    Ok(())
}

async fn describe_once(coordinator: &Coordinator) -> Result<glasscam::AnalysisOutcome, CoreError> {
    coordinator.start().await?;
    println!("Camera: {}", coordinator.session_state());

    // Real cameras need a moment before the first frame decodes
    let deadline = tokio::time::Instant::now() + FIRST_FRAME_TIMEOUT;
    loop {
        match coordinator.capture_and_analyze().await {
            Err(CoreError::Capture(CaptureError::EmptyFrame))
                if tokio::time::Instant::now() < deadline =>
            {
                tokio::time::sleep(FIRST_FRAME_POLL).await;
            }
            other => return other,
        }
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(
    action: &ConfigAction,
    path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let config_path: PathBuf = path.map(PathBuf::from).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(&config_path))?;
            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found, using defaults)", config_path.display());
            }
            println!();
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'glasscam config show' to view current settings.",
                    config_path.display()
                )
                .into());
            }

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Error creating config directory: {}", e))?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)
                .map_err(|e| format!("Error writing config file: {}", e))?;

            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_init_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        handle_config_action(&ConfigAction::Init, Some(&path)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            DEFAULT_CONFIG_TEMPLATE
        );
    }

    #[test]
    fn test_config_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[camera]\n").unwrap();

        let err = handle_config_action(&ConfigAction::Init, Some(&path)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[camera]\n");
    }

    #[test]
    fn test_config_show_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(handle_config_action(&ConfigAction::Show, Some(&path)).is_ok());
    }
}
