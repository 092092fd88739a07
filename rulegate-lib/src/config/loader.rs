use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{Result, RuleGateError};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| RuleGateError::Config(format!("Failed to read config file: {e}")))?;
    load_from_str(&txt)
}

pub fn load_from_str(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| RuleGateError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.default_action.trim().is_empty() {
        return Err(RuleGateError::Config("default_action must not be empty".to_string()));
    }

    if cfg.parser_pool.capacity == 0 {
        return Err(RuleGateError::Config(
            "parser_pool.capacity must be greater than zero".to_string(),
        ));
    }

    let mut ids = HashSet::with_capacity(cfg.rules.len());
    for rule in &cfg.rules {
        if !ids.insert(rule.id) {
            return Err(RuleGateError::Config(format!("Duplicate rule id: {}", rule.id)));
        }
        if rule.rule.trim().is_empty() {
            return Err(RuleGateError::Config(format!("Rule {} has empty text", rule.id)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> Result<()> {
        let cfg = load_from_str("")?;
        assert_eq!(cfg.default_action, "accept");
        assert!(cfg.rules.is_empty());
        assert!(cfg.access_lists.is_empty());
        assert_eq!(cfg.hit_table.idle_timeout_secs, 3600);
        assert_eq!(cfg.hit_table.sweep_interval_secs, 60);
        assert_eq!(cfg.parser_pool.capacity, 4);
        assert_eq!(cfg.parser_pool.acquire_timeout(), None);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.show_target);
        Ok(())
    }

    #[test]
    fn test_duplicate_rule_ids() {
        let txt = r#"
            [[rules]]
            id = 1
            rule = "Hits > 1 => reject"

            [[rules]]
            id = 1
            rule = "Hits > 2 => reject"
        "#;
        let err = load_from_str(txt);
        assert!(matches!(err, Err(RuleGateError::Config(msg)) if msg.contains("Duplicate rule id: 1")));
    }

    #[test]
    fn test_empty_default_action() {
        let err = load_from_str("default_action = \"  \"");
        assert!(matches!(err, Err(RuleGateError::Config(_))));
    }

    #[test]
    fn test_zero_pool_capacity() {
        let err = load_from_str("[parser_pool]\ncapacity = 0");
        assert!(matches!(err, Err(RuleGateError::Config(msg)) if msg.contains("capacity")));
    }

    #[test]
    fn test_invalid_access_list_entry() {
        let err = load_from_str("[access_lists]\noffice = [\"192.168.0.1/24\"]");
        assert!(matches!(err, Err(RuleGateError::Config(msg)) if msg.contains("office")));
    }

    #[test]
    fn test_sweeper_disabled() -> Result<()> {
        let cfg = load_from_str("[hit_table]\nsweep_interval_secs = 0")?;
        assert_eq!(cfg.hit_table.sweep_interval(), None);
        Ok(())
    }
}
