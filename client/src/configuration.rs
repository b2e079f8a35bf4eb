use std::path::{Path, PathBuf};

/// Configuration for the application
#[derive(serde::Deserialize, Debug, Clone)]
pub struct Settings {
    /// Whether to check the local service answers before requesting a tunnel.
    pub probe: bool,
    pub cloudflared: CloudflaredSettings,
    pub log: LogSettings,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct CloudflaredSettings {
    /// Path or name of the `cloudflared` executable.
    pub binary: String,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct LogSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Optional file that receives a copy of every log record.
    pub file: Option<PathBuf>,
}

/// Reads the configuration for the application from an optional
/// `configuration/settings.yaml` file in the current directory, layered
/// over built-in defaults and under `TUNNEL_*` environment variables.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;

    get_configuration_from(&base_path.join("configuration"))
}

/// As `get_configuration` but reading `settings.yaml` from a given directory.
pub fn get_configuration_from(
    configuration_directory: &Path,
) -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .set_default("probe", true)?
        .set_default("cloudflared.binary", "cloudflared")?
        .set_default("log.level", "warn")?
        .add_source(
            config::File::from(configuration_directory.join("settings.yaml")).required(false),
        )
        .add_source(
            config::Environment::with_prefix("TUNNEL")
                .prefix_separator("_")
                .separator("_"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
