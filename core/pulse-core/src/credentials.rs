//! Api key lookup and caching.
//!
//! Sources, first well-formed value wins:
//! 1. the key configured inside the editor
//! 2. `WAKATIME_API_KEY`
//! 3. stdout of `api_key_vault_cmd`
//! 4. `api_key` in the settings file
//!
//! Resolution can run a subprocess, so it is split from the cache: the owner
//! hands a [`KeySources`] snapshot to a task and feeds the result back with
//! [`Credentials::accept`].

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{is_valid_api_key, write_value, Settings, SETTINGS_SECTION};
use crate::error::ConfigError;

#[derive(Debug)]
pub struct Credentials {
    config_file: PathBuf,
    editor_key: Option<String>,
    cached: Option<String>,
}

impl Credentials {
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            editor_key: None,
            cached: None,
        }
    }

    pub fn set_editor_key(&mut self, key: Option<String>) {
        self.editor_key = key.filter(|k| !k.trim().is_empty());
        self.invalidate();
    }

    /// The cached key, if it is well-formed. `None` means a lookup is needed.
    pub fn cached(&self) -> Option<&str> {
        self.cached.as_deref().filter(|k| is_valid_api_key(k))
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn sources(&self) -> KeySources {
        KeySources {
            editor_key: self.editor_key.clone(),
            env_key: std::env::var("WAKATIME_API_KEY").ok(),
            config_file: self.config_file.clone(),
        }
    }

    pub fn accept(&mut self, resolved: Option<String>) {
        self.cached = resolved;
    }

    /// Validates, persists and caches a key entered by the user.
    pub fn store(&mut self, key: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        if !is_valid_api_key(key) {
            return Err(ConfigError::InvalidApiKey);
        }
        write_value(&self.config_file, SETTINGS_SECTION, "api_key", key)?;
        self.cached = Some(key.to_string());
        tracing::info!("Api key saved");
        Ok(())
    }

    /// Looks the key up and caches it.
    pub async fn api_key(&mut self) -> Option<String> {
        if let Some(key) = self.cached() {
            return Some(key.to_string());
        }
        let resolved = resolve(self.sources()).await;
        self.accept(resolved.clone());
        resolved
    }
}

/// Everything needed to resolve a key away from the owner.
#[derive(Debug, Clone)]
pub struct KeySources {
    pub editor_key: Option<String>,
    pub env_key: Option<String>,
    pub config_file: PathBuf,
}

pub async fn resolve(sources: KeySources) -> Option<String> {
    let valid = |key: Option<String>| {
        key.map(|k| k.trim().to_string())
            .filter(|k| is_valid_api_key(k))
    };

    if let Some(key) = valid(sources.editor_key) {
        return Some(key);
    }
    if let Some(key) = valid(sources.env_key) {
        return Some(key);
    }

    let settings = Settings::load(&sources.config_file);
    if let Some(cmd) = settings.api_key_vault_cmd.as_deref() {
        if let Some(key) = valid(run_vault_cmd(cmd).await) {
            return Some(key);
        }
    }
    valid(settings.api_key)
}

/// Runs the vault command (split on spaces, no shell) and returns its
/// trimmed stdout.
pub async fn run_vault_cmd(cmd: &str) -> Option<String> {
    let mut parts = cmd.split(' ').filter(|p| !p.is_empty());
    let program = parts.next()?;

    let output = match Command::new(program)
        .args(parts)
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, program = %program, "Failed to run api key vault command");
            return None;
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        tracing::warn!(stderr = %stderr.trim(), "Api key vault command wrote to stderr");
    }
    if !output.status.success() {
        tracing::warn!(status = ?output.status.code(), "Api key vault command failed");
    }

    let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const KEY_A: &str = "00000000-0000-4000-8000-00000000000a";
    const KEY_B: &str = "00000000-0000-4000-8000-00000000000b";

    fn sources(config_file: PathBuf) -> KeySources {
        KeySources {
            editor_key: None,
            env_key: None,
            config_file,
        }
    }

    #[tokio::test]
    async fn test_editor_key_wins() {
        let temp = tempdir().unwrap();
        let cfg = temp.path().join(".wakatime.cfg");
        std::fs::write(&cfg, format!("[settings]\napi_key = {KEY_B}\n")).unwrap();

        let mut s = sources(cfg);
        s.editor_key = Some(KEY_A.to_string());
        s.env_key = Some(KEY_B.to_string());
        assert_eq!(resolve(s).await.as_deref(), Some(KEY_A));
    }

    #[tokio::test]
    async fn test_malformed_sources_are_skipped() {
        let temp = tempdir().unwrap();
        let cfg = temp.path().join(".wakatime.cfg");
        std::fs::write(&cfg, format!("[settings]\napi_key = {KEY_B}\n")).unwrap();

        let mut s = sources(cfg);
        s.editor_key = Some("nope".to_string());
        s.env_key = Some("also-nope".to_string());
        assert_eq!(resolve(s).await.as_deref(), Some(KEY_B));
    }

    #[tokio::test]
    async fn test_missing_everything_is_none() {
        let temp = tempdir().unwrap();
        assert!(resolve(sources(temp.path().join("missing.cfg"))).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_vault_cmd_output_is_used() {
        let temp = tempdir().unwrap();
        let cfg = temp.path().join(".wakatime.cfg");
        std::fs::write(
            &cfg,
            format!("[settings]\napi_key_vault_cmd = echo {KEY_A}\napi_key = {KEY_B}\n"),
        )
        .unwrap();
        assert_eq!(resolve(sources(cfg)).await.as_deref(), Some(KEY_A));
    }

    #[test]
    fn test_store_rejects_malformed_key() {
        let temp = tempdir().unwrap();
        let mut creds = Credentials::new(temp.path().join(".wakatime.cfg"));
        assert!(matches!(
            creds.store("bad"),
            Err(ConfigError::InvalidApiKey)
        ));
        assert!(creds.cached().is_none());
    }

    #[tokio::test]
    async fn test_store_persists_and_caches() {
        let temp = tempdir().unwrap();
        let cfg = temp.path().join(".wakatime.cfg");
        let mut creds = Credentials::new(&cfg);
        creds.store(KEY_A).unwrap();

        assert_eq!(creds.cached(), Some(KEY_A));
        assert_eq!(Settings::load(&cfg).api_key.as_deref(), Some(KEY_A));
    }

    #[test]
    fn test_invalid_cached_value_is_not_served() {
        let temp = tempdir().unwrap();
        let mut creds = Credentials::new(temp.path().join(".wakatime.cfg"));
        creds.accept(Some("garbage".to_string()));
        assert!(creds.cached().is_none());

        creds.accept(Some(KEY_A.to_string()));
        assert_eq!(creds.cached(), Some(KEY_A));
        creds.invalidate();
        assert!(creds.cached().is_none());
    }
}
