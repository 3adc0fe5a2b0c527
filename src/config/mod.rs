mod types;

#[cfg(test)]
mod tests;

pub use types::AppConfig;

use anyhow::Result;
use std::path::Path;

impl AppConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used — the process can start with zero configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: AppConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .yaml or .json"),
                None => anyhow::bail!("config file has no extension, use .yaml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!("loaded application configuration");
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CLASH_API_URL") {
            self.api_url = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            anyhow::bail!("api_url cannot be empty");
        }
        if self.max_queue_size == 0 {
            anyhow::bail!("max_queue_size must be at least 1");
        }
        Ok(())
    }
}
