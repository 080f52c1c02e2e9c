//! `tickbridge config`: inspect the resolved configuration.

use std::path::Path;

use anyhow::{Result, bail};
use tickbridge_config::{HOME_VAR, ResolvedConfig, WORKSPACE_FILE};

/// Print the merged configuration as `toml` or `json`.
pub fn show(resolved: &ResolvedConfig, format: &str) -> Result<()> {
    let text = match format {
        "toml" => resolved.to_toml_string()?,
        "json" => resolved.to_json_string()?,
        other => bail!("unknown format '{other}'; expected toml or json"),
    };
    println!("{text}");
    Ok(())
}

/// Report that the configuration loaded and validated.
pub fn validate(resolved: &ResolvedConfig) {
    println!(
        "configuration valid ({} file(s) merged)",
        resolved.loaded_files.len()
    );
}

/// Print where configuration is read from.
pub fn paths(resolved: &ResolvedConfig, workspace: Option<&Path>) {
    match std::env::var(HOME_VAR) {
        Ok(home) => println!("user:      {home}/config.toml (from {HOME_VAR})"),
        Err(_) => println!("user:      ~/.tickbridge/config.toml"),
    }
    if let Some(root) = workspace {
        println!("workspace: {}", root.join(WORKSPACE_FILE).display());
    }
    if resolved.loaded_files.is_empty() {
        println!("loaded:    (defaults only)");
    }
    for file in &resolved.loaded_files {
        println!("loaded:    {file}");
    }
}
