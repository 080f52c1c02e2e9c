//! Environment variable fallbacks.
//!
//! Env vars are fallbacks, not overrides: they only fill fields that no
//! config file set.

use std::collections::{HashMap, HashSet};

use tracing::debug;

/// Environment variable that relocates the user config directory.
pub const HOME_VAR: &str = "TICKBRIDGE_HOME";

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    numeric: bool,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "TICKBRIDGE_LOG_LEVEL",
        field_path: "logging.level",
        numeric: false,
    },
    EnvMapping {
        var_name: "TICKBRIDGE_LOG_FORMAT",
        field_path: "logging.format",
        numeric: false,
    },
    EnvMapping {
        var_name: "TICKBRIDGE_LOG_DIR",
        field_path: "logging.directory",
        numeric: false,
    },
    EnvMapping {
        var_name: "TICKBRIDGE_WORKERS_MODE",
        field_path: "workers.mode",
        numeric: false,
    },
    EnvMapping {
        var_name: "TICKBRIDGE_WORKERS_SIZE",
        field_path: "workers.size",
        numeric: true,
    },
    EnvMapping {
        var_name: "TICKBRIDGE_DRAIN_POLICY",
        field_path: "delivery.drain",
        numeric: false,
    },
];

/// Snapshot the `TICKBRIDGE_*` variables of this process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("TICKBRIDGE_"))
        .collect()
}

/// Apply fallbacks to `merged` for every mapped field not in `set_by_files`.
///
/// Returns the number of variables applied.
pub fn apply_env_fallbacks<S: std::hash::BuildHasher>(
    merged: &mut toml::Value,
    set_by_files: &HashSet<String>,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut applied: usize = 0;

    for mapping in ENV_MAPPINGS {
        if set_by_files.contains(mapping.field_path) {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        let value = if mapping.numeric {
            match raw.trim().parse::<i64>() {
                Ok(n) => toml::Value::Integer(n),
                Err(_) => {
                    debug!(var = mapping.var_name, value = %raw, "ignoring non-numeric env var");
                    continue;
                },
            }
        } else {
            toml::Value::String(raw.clone())
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        set_field(merged, mapping.field_path, value);
        applied = applied.saturating_add(1);
    }

    applied
}

/// Set a dotted `path` in a TOML tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}
