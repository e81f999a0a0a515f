//! Download configuration.
//!
//! [`Options`] holds what the caller asked for; [`DownloadConfig::resolve`]
//! turns it into the immutable configuration a [`Download`](crate::Download)
//! runs with, applying the defaulting rules against the probed resource.
//! [`Settings`] is the optional user configuration file read by the CLI.
use crate::error::{DownloadError, Result};
use crate::planner::use_multiple_segments;
use crate::probe::{FALLBACK_FILE_NAME, ResourceDescriptor};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/51.0.2704.103 Safari/537.36";

/// Requested settings for one download. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub threads: Option<usize>,
    pub directory: Option<PathBuf>,
    pub temp_directory: Option<PathBuf>,
    pub file_name: Option<String>,
    pub user_agent: Option<String>,
}

impl Options {
    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .filter(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
    }
}

/// Resolved, immutable configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    thread_count: usize,
    directory: PathBuf,
    temp_directory: PathBuf,
    file_name: String,
    file_path: PathBuf,
    user_agent: String,
}

impl DownloadConfig {
    /// Applies the defaulting rules:
    ///
    /// * thread count is 1 unless more were asked for, the server honours
    ///   ranges and the resource has at least one byte per thread;
    /// * directory defaults to the current working directory;
    /// * temp directory defaults to the directory;
    /// * file name defaults to the server-suggested name;
    /// * user agent defaults to the one the resource was probed with, then
    ///   to [`DEFAULT_USER_AGENT`].
    pub fn resolve(options: &Options, descriptor: &ResourceDescriptor) -> Result<Self> {
        let requested = options.threads.unwrap_or(1);
        let thread_count = if use_multiple_segments(
            requested,
            descriptor.supports_ranges,
            descriptor.content_length,
        ) {
            requested
        } else {
            1
        };

        let directory = match options.directory.as_deref() {
            Some(dir) if !dir.as_os_str().is_empty() => absolute(dir)?,
            _ => current_dir()?,
        };
        let temp_directory = match options.temp_directory.as_deref() {
            Some(dir) if !dir.as_os_str().is_empty() => absolute(dir)?,
            _ => directory.clone(),
        };

        let file_name = options
            .file_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| Some(descriptor.suggested_name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
        let file_path = directory.join(&file_name);

        let user_agent = options
            .user_agent
            .clone()
            .filter(|ua| !ua.is_empty())
            .or_else(|| Some(descriptor.user_agent.clone()).filter(|ua| !ua.is_empty()))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Ok(Self {
            thread_count,
            directory,
            temp_directory,
            file_name,
            file_path,
            user_agent,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn temp_directory(&self) -> &Path {
        &self.temp_directory
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|source| DownloadError::Setup {
        path: PathBuf::from("."),
        source,
    })
}

fn absolute(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(current_dir()?.join(dir))
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Values from the user's `config.toml`. Command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub threads: Option<usize>,
    pub default_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl Settings {
    /// `<config dir>/partfetch/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("partfetch").join("config.toml"))
    }

    /// Loads the settings file from [`Settings::default_path`]. A missing
    /// file yields the defaults.
    pub fn load() -> std::result::Result<Self, SettingsError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> std::result::Result<Self, SettingsError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
