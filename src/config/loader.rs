use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix of environment variables overlaid on top of the configuration file.
pub const ENV_PREFIX: &str = "GATEWAY";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let mut server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    resolve_route_targets(&mut server_config, |name| std::env::var(name).ok())?;

    Ok(server_config)
}

/// Apply the `environment -> file -> error` fallback chain to every upstream
/// target. `lookup` abstracts the environment so the chain is testable.
pub fn resolve_route_targets<F>(config: &mut ServerConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for (prefix, route) in config.routes.iter_mut() {
        if let Some(var) = &route.target_env {
            match lookup(var).filter(|v| !v.trim().is_empty()) {
                Some(value) => {
                    tracing::debug!(
                        route = %prefix,
                        env = %var,
                        "Upstream target resolved from environment"
                    );
                    route.target = value.trim().to_string();
                }
                None if !route.target.is_empty() => {
                    tracing::debug!(
                        route = %prefix,
                        env = %var,
                        "Environment variable unset, using configured target"
                    );
                }
                None => {}
            }
        }

        if route.target.trim().is_empty() {
            let checked = match &route.target_env {
                Some(var) => format!("environment variable '{var}', configuration"),
                None => "configuration".to_string(),
            };
            return Err(eyre::eyre!(
                "Required upstream target for route '{prefix}' not found. Checked: {checked}"
            ));
        }
    }
    Ok(())
}
