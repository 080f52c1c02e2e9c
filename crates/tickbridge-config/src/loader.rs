//! Config file discovery and layered loading.
//!
//! `load` merges, lowest precedence first:
//! 1. embedded `defaults.toml`
//! 2. user file (`~/.tickbridge/config.toml`, or `$TICKBRIDGE_HOME/config.toml`)
//! 3. workspace file (`{workspace}/tickbridge.toml`)
//! 4. an explicit file passed by the caller
//!
//! then applies env var fallbacks to fields no file set, deserializes, and
//! validates.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{HOME_VAR, apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Workspace config file name.
pub const WORKSPACE_FILE: &str = "tickbridge.toml";

/// Maximum accepted config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Where to look for configuration files.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Directory holding `tickbridge.toml`. Skipped when `None`.
    pub workspace_root: Option<PathBuf>,
    /// Directory holding the user `config.toml`, replacing discovery.
    pub home_override: Option<PathBuf>,
    /// A file merged last, e.g. from `--config`.
    pub explicit_file: Option<PathBuf>,
    /// Skip the user layer entirely.
    pub skip_user: bool,
}

/// A merged configuration plus the files that contributed to it.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Final configuration.
    pub config: Config,
    /// Files merged, in precedence order.
    pub loaded_files: Vec<String>,
    /// Dotted field paths that a file (not defaults or env) set.
    pub file_fields: HashSet<String>,
}

impl ResolvedConfig {
    /// Render the configuration as TOML with a header listing the sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RenderError`] if serialization fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        let body = toml::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::RenderError(e.to_string()))?;

        let mut out = String::from("# Resolved tickbridge configuration\n");
        if self.loaded_files.is_empty() {
            out.push_str("# sources: defaults only\n");
        } else {
            for file in &self.loaded_files {
                out.push_str("# source: ");
                out.push_str(file);
                out.push('\n');
            }
        }
        out.push('\n');
        out.push_str(&body);
        Ok(out)
    }

    /// Render the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RenderError`] if serialization fails.
    pub fn to_json_string(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::RenderError(e.to_string()))
    }
}

/// Load configuration with layered precedence.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable or malformed, or if the
/// merged configuration fails validation.
pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    let env_vars = collect_env_vars();

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut file_fields = HashSet::new();
    let mut loaded_files = Vec::new();

    let mut layers: Vec<PathBuf> = Vec::new();
    if !options.skip_user {
        if let Some(path) = user_config_path(options.home_override.as_deref(), &env_vars)? {
            layers.push(path);
        }
    }
    if let Some(root) = &options.workspace_root {
        layers.push(root.join(WORKSPACE_FILE));
    }

    for path in layers {
        if let Some(overlay) = try_load_file(&path)? {
            merge_tracking(&mut merged, &overlay, "", &mut file_fields);
            info!(path = %path.display(), "loaded config layer");
            loaded_files.push(path.display().to_string());
        }
    }

    // An explicit file must exist.
    if let Some(path) = &options.explicit_file {
        let overlay = read_toml(path)?;
        merge_tracking(&mut merged, &overlay, "", &mut file_fields);
        info!(path = %path.display(), "loaded explicit config");
        loaded_files.push(path.display().to_string());
    }

    let applied = apply_env_fallbacks(&mut merged, &file_fields, &env_vars);
    if applied > 0 {
        debug!(count = applied, "applied environment fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        loaded_files,
        file_fields,
    })
}

/// Load a single file on top of the defaults, without env fallbacks.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = read_toml(path)?;
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    merge_tracking(&mut merged, &overlay, "", &mut HashSet::new());

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Parse and validate a configuration from a TOML string.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the string is malformed or invalid.
pub fn from_toml_str(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

fn user_config_path<S: std::hash::BuildHasher>(
    home_override: Option<&Path>,
    env_vars: &std::collections::HashMap<String, String, S>,
) -> ConfigResult<Option<PathBuf>> {
    if let Some(dir) = home_override {
        return Ok(Some(dir.join("config.toml")));
    }
    if let Some(dir) = env_vars.get(HOME_VAR) {
        return Ok(Some(PathBuf::from(dir).join("config.toml")));
    }
    let base = directories::BaseDirs::new().ok_or(ConfigError::NoHomeDir)?;
    Ok(Some(base.home_dir().join(".tickbridge").join("config.toml")))
}

fn read_toml(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_sized(path, &content)
}

/// Load a file, returning `None` if it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };
    parse_sized(path, &content).map(Some)
}

fn parse_sized(path: &Path, content: &str) -> ConfigResult<toml::Value> {
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

/// Deep-merge `overlay` into `base`, recording each leaf path it sets.
/// Tables merge per key; scalars and arrays replace.
fn merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    fields: &mut HashSet<String>,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match base_table.get_mut(key) {
                    Some(base_val) => merge_tracking(base_val, overlay_val, &path, fields),
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                        record_leaves(overlay_val, &path, fields);
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            fields.insert(prefix.to_owned());
        },
    }
}

fn record_leaves(val: &toml::Value, prefix: &str, fields: &mut HashSet<String>) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &format!("{prefix}.{key}"), fields);
        }
    } else {
        fields.insert(prefix.to_owned());
    }
}
