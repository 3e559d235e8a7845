use std::{env, path::PathBuf, time::Duration};

use crate::history::DEFAULT_MAX_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub records_path: PathBuf,
    pub history_max_size: usize,
    pub search_debounce: Duration,
    pub top_groups_limit: usize,
    pub history_export_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let records_path = lookup("BLOCKLIST_RECORDS_PATH")
            .map(|v| clean(&v))
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("records.json"));

        let history_max_size = lookup("BLOCKLIST_HISTORY_MAX_SIZE")
            .and_then(|v| clean(&v).parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_SIZE);

        let search_debounce_ms = lookup("BLOCKLIST_SEARCH_DEBOUNCE_MS")
            .and_then(|v| clean(&v).parse::<u64>().ok())
            .unwrap_or(250);

        let top_groups_limit = lookup("BLOCKLIST_TOP_GROUPS_LIMIT")
            .and_then(|v| clean(&v).parse::<usize>().ok())
            .unwrap_or(10);

        let history_export_path = lookup("BLOCKLIST_HISTORY_EXPORT_PATH")
            .map(|v| clean(&v))
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            records_path,
            history_max_size,
            search_debounce: Duration::from_millis(search_debounce_ms),
            top_groups_limit,
            history_export_path,
        }
    }
}

fn clean(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.records_path, PathBuf::from("records.json"));
        assert_eq!(config.history_max_size, 100);
        assert_eq!(config.search_debounce, Duration::from_millis(250));
        assert_eq!(config.top_groups_limit, 10);
        assert!(config.history_export_path.is_none());
    }

    #[test]
    fn values_are_trimmed_and_unquoted() {
        let config = config_from(&[
            ("BLOCKLIST_RECORDS_PATH", " \"/data/records.json\" "),
            ("BLOCKLIST_HISTORY_MAX_SIZE", "25"),
            ("BLOCKLIST_SEARCH_DEBOUNCE_MS", "'300'"),
            ("BLOCKLIST_HISTORY_EXPORT_PATH", "/data/history.json"),
        ]);
        assert_eq!(config.records_path, PathBuf::from("/data/records.json"));
        assert_eq!(config.history_max_size, 25);
        assert_eq!(config.search_debounce, Duration::from_millis(300));
        assert_eq!(
            config.history_export_path,
            Some(PathBuf::from("/data/history.json"))
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_from(&[
            ("BLOCKLIST_HISTORY_MAX_SIZE", "0"),
            ("BLOCKLIST_TOP_GROUPS_LIMIT", "lots"),
            ("BLOCKLIST_HISTORY_EXPORT_PATH", "  "),
        ]);
        assert_eq!(config.history_max_size, 100);
        assert_eq!(config.top_groups_limit, 10);
        assert!(config.history_export_path.is_none());
    }
}
