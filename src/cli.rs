//! Operator CLI (§6 surface): inspect and mutate the running config, and
//! exercise the webhook path without a live signal.

use clap::{Parser, Subcommand};

use crate::config::{ConfigManager, ConfigSnapshot, Preset};

#[derive(Parser)]
#[command(name = "surveillance-bot")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the orchestrator's scan loop (default when no subcommand is given).
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show { section: Option<String> },
    Set { path: String, value: String },
    Preset { name: String },
    Validate,
    Export { file: Option<String> },
}

#[derive(Subcommand)]
pub enum NotifyAction {
    TestAlert,
}

/// Exit code 0 on success, 1 on validation failure or unknown path —
/// matching §6 exactly.
pub fn run_config_action(manager: &ConfigManager, action: &ConfigAction) -> i32 {
    match action {
        ConfigAction::Show { section } => {
            let cfg = manager.current();
            match section.as_deref() {
                None => println!("{:#?}", cfg),
                Some("rate_limits") => println!("{:#?}", cfg.rate_limits),
                Some("cooldowns") => println!("{:#?}", cfg.cooldowns),
                Some("weights") => println!("{:#?}", cfg.opportunity_weights),
                Some("priorities") => println!("{:#?}", cfg.priority_thresholds),
                Some(other) => {
                    eprintln!("unknown config section: {other}");
                    return 1;
                }
            }
            0
        }
        ConfigAction::Set { path, value } => set_dotted_path(manager, path, value),
        ConfigAction::Preset { name } => match Preset::parse(name) {
            Some(preset) => match manager.apply_preset(preset) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("preset rejected: {e}");
                    1
                }
            },
            None => {
                eprintln!("unknown preset: {name}");
                1
            }
        },
        ConfigAction::Validate => match crate::config::validate(&manager.current()) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("invalid config: {e}");
                1
            }
        },
        ConfigAction::Export { file } => export_config(manager, file.as_deref()),
    }
}

fn set_dotted_path(manager: &ConfigManager, path: &str, value: &str) -> i32 {
    let mut cfg = manager.current();
    let applied = match path {
        "min_opportunity_score" => value.parse().map(|v| cfg.min_opportunity_score = v).is_ok(),
        "volume_spike_multiplier" => value.parse().map(|v| cfg.volume_spike_multiplier = v).is_ok(),
        "anomaly_consensus_threshold" => value.parse().map(|v| cfg.anomaly_consensus_threshold = v).is_ok(),
        "correlation_threshold" => value.parse().map(|v| cfg.correlation_threshold = v).is_ok(),
        "min_markets" => value.parse().map(|v| cfg.min_markets = v).is_ok(),
        "priority_thresholds.critical" => value.parse().map(|v| cfg.priority_thresholds.critical = v).is_ok(),
        "priority_thresholds.high" => value.parse().map(|v| cfg.priority_thresholds.high = v).is_ok(),
        "priority_thresholds.medium" => value.parse().map(|v| cfg.priority_thresholds.medium = v).is_ok(),
        _ => {
            eprintln!("unknown config path: {path}");
            return 1;
        }
    };
    if !applied {
        eprintln!("could not parse value {value:?} for {path}");
        return 1;
    }
    match manager.apply(cfg) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("rejected: {e}");
            1
        }
    }
}

fn export_config(manager: &ConfigManager, file: Option<&str>) -> i32 {
    let cfg: ConfigSnapshot = manager.current();
    let toml_str = match toml_serialize(&cfg) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("could not serialize config: {e}");
            return 1;
        }
    };
    match file {
        Some(path) => match std::fs::write(path, toml_str) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("could not write {path}: {e}");
                1
            }
        },
        None => {
            println!("{toml_str}");
            0
        }
    }
}

fn toml_serialize(cfg: &ConfigSnapshot) -> Result<String, toml::ser::Error> {
    #[derive(serde::Serialize)]
    struct Exportable {
        min_volume_floor: f64,
        volume_spike_multiplier: f64,
        min_volume_threshold: f64,
        price_move_threshold_pct: f64,
        activity_threshold: f64,
        correlation_threshold: f64,
        min_markets: usize,
        min_opportunity_score: f64,
        min_category_score: u32,
    }
    toml::to_string_pretty(&Exportable {
        min_volume_floor: cfg.min_volume_floor,
        volume_spike_multiplier: cfg.volume_spike_multiplier,
        min_volume_threshold: cfg.min_volume_threshold,
        price_move_threshold_pct: cfg.price_move_threshold_pct,
        activity_threshold: cfg.activity_threshold,
        correlation_threshold: cfg.correlation_threshold,
        min_markets: cfg.min_markets,
        min_opportunity_score: cfg.min_opportunity_score,
        min_category_score: cfg.min_category_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_unknown_path_returns_exit_code_one() {
        let manager = ConfigManager::new(ConfigSnapshot::default()).unwrap();
        let code = set_dotted_path(&manager, "not.a.real.path", "1.0");
        assert_eq!(code, 1);
    }

    #[test]
    fn set_valid_path_updates_config() {
        let manager = ConfigManager::new(ConfigSnapshot::default()).unwrap();
        let code = set_dotted_path(&manager, "min_opportunity_score", "42.0");
        assert_eq!(code, 0);
        assert_eq!(manager.current().min_opportunity_score, 42.0);
    }

    #[test]
    fn export_without_file_path_succeeds() {
        let manager = ConfigManager::new(ConfigSnapshot::default()).unwrap();
        let code = export_config(&manager, None);
        assert_eq!(code, 0);
    }
}
