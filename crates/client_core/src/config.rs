use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::auth::DEFAULT_IDENTITY_TOOLKIT_URL;

pub const DEFAULT_CONFIG_FILE: &str = "athena.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_url: String,
    pub auth_api_key: Option<String>,
    pub identity_toolkit_url: String,
    pub database_url: String,
    pub request_timeout_secs: u64,
    pub processing_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".into(),
            auth_api_key: None,
            identity_toolkit_url: DEFAULT_IDENTITY_TOOLKIT_URL.into(),
            database_url: default_database_url(),
            request_timeout_secs: 15,
            processing_timeout_secs: 120,
        }
    }
}

impl Settings {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: Duration::from_secs(self.request_timeout_secs.max(1)),
            processing: Duration::from_secs(self.processing_timeout_secs.max(1)),
        }
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.backend_url {
            self.backend_url = v;
        }
        if let Some(v) = file.auth_api_key {
            self.auth_api_key = Some(v);
        }
        if let Some(v) = file.identity_toolkit_url {
            self.identity_toolkit_url = v;
        }
        if let Some(v) = file.database_url {
            self.database_url = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file.processing_timeout_secs {
            self.processing_timeout_secs = v;
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let last = |names: &[&str]| names.iter().rev().find_map(|name| lookup(name));

        if let Some(v) = last(&["ATHENA_BACKEND_URL", "APP__BACKEND_URL"]) {
            self.backend_url = v;
        }
        if let Some(v) = last(&["FIREBASE_API_KEY", "ATHENA_AUTH_API_KEY", "APP__AUTH_API_KEY"]) {
            self.auth_api_key = Some(v);
        }
        if let Some(v) = last(&["ATHENA_IDENTITY_TOOLKIT_URL", "APP__IDENTITY_TOOLKIT_URL"]) {
            self.identity_toolkit_url = v;
        }
        if let Some(v) = last(&["ATHENA_DATABASE_URL", "APP__DATABASE_URL"]) {
            self.database_url = v;
        }
        if let Some(v) = last(&["ATHENA_REQUEST_TIMEOUT_SECS", "APP__REQUEST_TIMEOUT_SECS"]) {
            match v.parse::<u64>() {
                Ok(parsed) => self.request_timeout_secs = parsed,
                Err(err) => warn!(value = %v, %err, "config: ignoring request timeout override"),
            }
        }
        if let Some(v) = last(&["ATHENA_PROCESSING_TIMEOUT_SECS", "APP__PROCESSING_TIMEOUT_SECS"]) {
            match v.parse::<u64>() {
                Ok(parsed) => self.processing_timeout_secs = parsed,
                Err(err) => warn!(value = %v, %err, "config: ignoring processing timeout override"),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request: Duration,
    pub processing: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Settings::default().timeouts()
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    auth_api_key: Option<String>,
    identity_toolkit_url: Option<String>,
    database_url: Option<String>,
    request_timeout_secs: Option<u64>,
    processing_timeout_secs: Option<u64>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => settings.apply_file(file_cfg),
            Err(err) => warn!(path = %path.display(), %err, "config: ignoring unreadable config file"),
        }
    }

    settings.apply_env(|name| std::env::var(name).ok());
    settings
}

fn default_database_url() -> String {
    match dirs::data_local_dir() {
        Some(dir) => format!("sqlite://{}", dir.join("athena").join("client.db").display()),
        None => "sqlite://./data/client.db".into(),
    }
}
