//! `turnwise config`: configuration management commands.

use std::path::{Path, PathBuf};

use turnwise_config::AppConfig;

use super::load_config;

pub fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path).map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.to_toml());
    Ok(())
}

pub fn default() {
    println!("{}", AppConfig::default_toml());
}

pub fn path(path: Option<&Path>) {
    let resolved: PathBuf = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("{}", resolved.display());
}

pub fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    let mut warnings = Vec::new();
    if config.context.max_tokens < 500 {
        warnings.push("context.max_tokens is very small; most turns will truncate history");
    }
    if config.dialogue.compression_interval > config.dialogue.max_turns {
        warnings.push("dialogue.compression_interval exceeds max_turns; only the forced compression will run");
    }
    if config.sessions.max_sessions.is_none() && config.sessions.idle_ttl_secs.is_none() {
        warnings.push("sessions are unbounded; set max_sessions or idle_ttl_secs");
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Budget:       {} tokens", config.context.max_tokens);
    println!("   Encoding:     {}", config.context.encoding);
    println!(
        "   Compression:  every {} turns, forced at {}",
        config.dialogue.compression_interval, config.dialogue.max_turns
    );
    println!(
        "   Sessions:     max {}, idle ttl {}",
        config
            .sessions
            .max_sessions
            .map_or("unbounded".to_string(), |n| n.to_string()),
        config
            .sessions
            .idle_ttl_secs
            .map_or("none".to_string(), |s| format!("{s}s"))
    );

    Ok(())
}
