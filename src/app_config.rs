//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

use crate::cli::OnExisting;

/// Key = value file configuration for harvester defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Base output directory for downloads.
    pub output_dir: Option<PathBuf>,
    /// Attempts per file (same range as CLI).
    pub max_retries: Option<u32>,
    /// Backoff unit in milliseconds.
    pub backoff_unit_ms: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub page_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Existing-file handling.
    pub on_existing: Option<OnExisting>,
    /// Fallback renderer command template.
    pub render_command: Option<String>,
    /// Phrases meaning "nothing published".
    pub empty_markers: Option<Vec<String>>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(max_retries) = self.max_retries
            && !(1..=10).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=10");
        }

        if let Some(unit) = self.backoff_unit_ms
            && unit > 60_000
        {
            bail!("Invalid config value for `backoff_unit_ms`: {unit}. Expected range: 0..=60000");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("page_timeout_secs", self.page_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        if let Some(template) = &self.render_command
            && !template.contains("{url}")
        {
            bail!("Invalid config value for `render_command`: the template must contain {{url}}");
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl std::str::FromStr for VerbositySetting {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "default" => Ok(Self::Default),
            "verbose" => Ok(Self::Verbose),
            "quiet" => Ok(Self::Quiet),
            "debug" => Ok(Self::Debug),
            _ => bail!("Expected one of: default, verbose, quiet, debug"),
        }
    }
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/harvester/config.toml`
/// 2. `$HOME/.config/harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("harvester").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("harvester")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config_from(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file '{}' does not exist", path.display());
        }
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref().filter(|p| p.exists()) else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// One `key = value` entry with its 1-based line number.
struct Entry<'a> {
    line_no: usize,
    key: &'a str,
    value: &'a str,
}

impl<'a> Entry<'a> {
    fn parse(line_no: usize, raw_line: &'a str) -> Result<Option<Self>> {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        Ok(Some(Self {
            line_no,
            key: key.trim(),
            value: value.trim(),
        }))
    }

    fn context(&self) -> String {
        format!("Invalid `{}` value on line {}", self.key, self.line_no)
    }

    /// Double-quoted string.
    fn text(&self) -> Result<String> {
        let inner = self
            .value
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'));
        match inner {
            Some(inner) => Ok(inner.to_string()),
            None => Err(anyhow!("Expected double-quoted string")).with_context(|| self.context()),
        }
    }

    /// Non-negative integer that fits in `T`.
    fn number<T: TryFrom<u64>>(&self) -> Result<T> {
        unsigned_in_range(self.value).with_context(|| self.context())
    }
}

fn unsigned_in_range<T: TryFrom<u64>>(value: &str) -> Result<T> {
    if value.is_empty() {
        bail!("Expected integer value");
    }
    let wide = value.parse::<i128>()?;
    if wide < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(wide)
        .ok()
        .and_then(|unsigned| T::try_from(unsigned).ok())
        .ok_or_else(|| anyhow!("Integer value out of range"))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (index, raw_line) in raw.lines().enumerate() {
        let Some(entry) = Entry::parse(index + 1, raw_line)? else {
            continue;
        };

        match entry.key {
            "output_dir" => cfg.output_dir = Some(PathBuf::from(entry.text()?)),
            "max_retries" => cfg.max_retries = Some(entry.number()?),
            "backoff_unit_ms" => cfg.backoff_unit_ms = Some(entry.number()?),
            "connect_timeout_secs" => cfg.connect_timeout_secs = Some(entry.number()?),
            "page_timeout_secs" => cfg.page_timeout_secs = Some(entry.number()?),
            "read_timeout_secs" => cfg.read_timeout_secs = Some(entry.number()?),
            "on_existing" => {
                let label = entry.text()?;
                let mode = OnExisting::from_label(&label).with_context(|| {
                    format!(
                        "Invalid `on_existing` value '{label}' on line {}: expected ask, skip or overwrite",
                        entry.line_no
                    )
                })?;
                cfg.on_existing = Some(mode);
            }
            "render_command" => cfg.render_command = Some(entry.text()?),
            "empty_markers" => {
                let markers: Vec<String> = entry
                    .text()?
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect();
                if markers.is_empty() {
                    bail!(
                        "Invalid `empty_markers` value on line {}: expected at least one marker",
                        entry.line_no
                    );
                }
                cfg.empty_markers = Some(markers);
            }
            "verbosity" => {
                let label = entry.text()?;
                let setting = label.parse::<VerbositySetting>().with_context(|| {
                    format!("Invalid `verbosity` value '{label}' on line {}", entry.line_no)
                })?;
                cfg.verbosity = Some(setting);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {}", entry.line_no);
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Cuts a `#` comment unless it sits inside a quoted string.
fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    line.char_indices()
        .find(|&(_, ch)| {
            if ch == '"' {
                quoted = !quoted;
            }
            ch == '#' && !quoted
        })
        .map_or(line, |(index, _)| &line[..index])
}
