use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" | "default" => Ok(Profile::Development),
            "production" | "prod" => Ok(Profile::Production),
            other => Err(anyhow!(
                "unknown profile '{}' (expected development or production)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }

    fn default_min_interval(&self) -> Duration {
        match self {
            Profile::Development => Duration::from_secs(1),
            Profile::Production => Duration::from_secs(2),
        }
    }

    fn default_probe_cache(&self) -> Duration {
        match self {
            Profile::Development => Duration::from_secs(10),
            Profile::Production => Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub profile: Profile,
    pub min_interval: Option<Duration>,
    pub timeout: Duration,
    pub english_lang: String,
    pub foreign_lang: String,
    pub base_url: String,
    pub probe_enabled: bool,
    pub probe_url: String,
    pub probe_cache: Option<Duration>,
    pub library_path: PathBuf,
    pub server_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: Profile::Development,
            min_interval: None,
            timeout: Duration::from_secs(8),
            english_lang: "en".to_string(),
            foreign_lang: "zh-CN".to_string(),
            base_url: "https://translate.googleapis.com".to_string(),
            probe_enabled: true,
            probe_url: "https://translate.google.com".to_string(),
            probe_cache: None,
            library_path: PathBuf::from("prompts.json"),
            server_addr: "127.0.0.1:8765".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSettings>,
    probe: Option<ProbeSettings>,
    library: Option<LibrarySettings>,
    server: Option<ServerSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    profile: Option<String>,
    min_interval: Option<f64>,
    timeout: Option<f64>,
    english: Option<String>,
    foreign: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeSettings {
    enabled: Option<bool>,
    url: Option<String>,
    cache_seconds: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LibrarySettings {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_toml(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    /// Minimum spacing between translation calls; an explicit value wins over the profile.
    pub fn effective_min_interval(&self) -> Duration {
        self.min_interval
            .unwrap_or_else(|| self.profile.default_min_interval())
    }

    pub fn effective_probe_cache(&self) -> Duration {
        self.probe_cache
            .unwrap_or_else(|| self.profile.default_probe_cache())
    }

    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed)
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(translation) = incoming.translation {
            if let Some(profile) = translation.profile {
                self.profile = Profile::parse(&profile)?;
            }
            if let Some(secs) = translation.min_interval {
                self.min_interval = Some(seconds("translation.min_interval", secs)?);
            }
            if let Some(secs) = translation.timeout {
                let timeout = seconds("translation.timeout", secs)?;
                if !timeout.is_zero() {
                    self.timeout = timeout;
                }
            }
            if let Some(lang) = translation.english {
                if !lang.trim().is_empty() {
                    self.english_lang = lang.trim().to_string();
                }
            }
            if let Some(lang) = translation.foreign {
                if !lang.trim().is_empty() {
                    self.foreign_lang = lang.trim().to_string();
                }
            }
            if let Some(url) = translation.base_url {
                if !url.trim().is_empty() {
                    self.base_url = url.trim().trim_end_matches('/').to_string();
                }
            }
        }
        if let Some(probe) = incoming.probe {
            if let Some(enabled) = probe.enabled {
                self.probe_enabled = enabled;
            }
            if let Some(url) = probe.url {
                if !url.trim().is_empty() {
                    self.probe_url = url.trim().to_string();
                }
            }
            if let Some(secs) = probe.cache_seconds {
                let ttl = seconds("probe.cache_seconds", secs)?;
                if !ttl.is_zero() {
                    self.probe_cache = Some(ttl);
                }
            }
        }
        if let Some(library) = incoming.library {
            if let Some(path) = library.path {
                if !path.trim().is_empty() {
                    self.library_path = PathBuf::from(path.trim());
                }
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr {
                if !addr.trim().is_empty() {
                    self.server_addr = addr.trim().to_string();
                }
            }
        }
        Ok(())
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|err| anyhow!("invalid {} = {}: {}", field, secs, err))
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".prompt-translator-rust"))
        }
    })
}
