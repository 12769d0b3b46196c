//! Unit tests for configuration structures and parsing.

#[cfg(test)]
mod config_tests {
    use std::collections::HashMap;

    use crate::config::*;
    use crate::error::ConfigError;
    use rust_decimal_macros::dec;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn with_key() -> AppConfig {
        let mut config = AppConfig::default();
        config.price_source.api_key = Some("demo".to_string());
        config
    }

    // ============= Defaults =============

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.roles, Role::ALL.to_vec());
        assert_eq!(config.event_log.backend, "memory");
        assert_eq!(config.event_log.topic, "stock_prices");
        assert_eq!(config.groups.alert, "stock-alerts-consumer");
        assert_eq!(config.groups.signal_analytics, "analytics-consumer-group");
        assert_eq!(config.fetcher.interval_secs, 60);
        assert_eq!(config.signal.short_window, 5);
        assert_eq!(config.signal.long_window, 20);
        assert_eq!(config.signal.window_capacity, 20);
        assert!(config.watchlist.is_empty());
    }

    #[test]
    fn test_default_requires_api_key_for_fetcher() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ALPHA_VANTAGE_API_KEY")));
        assert!(with_key().validate().is_ok());
    }

    #[test]
    fn test_consumers_only_need_no_api_key() {
        let mut config = AppConfig::default();
        config.roles = vec![Role::Alert, Role::Daily];
        assert!(config.validate().is_ok());
        assert!(!config.runs(Role::Fetcher));
    }

    // ============= YAML =============

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
roles: [fetcher, signal]
fetcher:
  interval_secs: 15
signal:
  short_window: 3
  long_window: 10
  window_capacity: 10
watchlist:
  - user_id: 1
    symbol: AAPL
    threshold_price: 180.5
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.roles, vec![Role::Fetcher, Role::Signal]);
        assert_eq!(config.fetcher.interval_secs, 15);
        assert_eq!(config.signal.short_window, 3);
        assert_eq!(config.event_log.partitions, 4);
        assert_eq!(config.watchlist.len(), 1);
        assert_eq!(config.watchlist[0].threshold_price, dec!(180.5));
    }

    #[test]
    fn test_from_yaml_strips_bom() {
        let config = AppConfig::from_yaml("\u{feff}shutdown_grace_secs: 3\n").unwrap();
        assert_eq!(config.shutdown_grace_secs, 3);
    }

    #[test]
    fn test_from_yaml_unknown_role() {
        assert!(matches!(
            AppConfig::from_yaml("roles: [trader]"),
            Err(ConfigError::Parse(_))
        ));
    }

    // ============= Environment =============

    #[test]
    fn test_env_overrides_file() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("KAFKA_BROKER", "broker:9093"),
                ("ALPHA_VANTAGE_API_KEY", "secret"),
                ("FETCH_INTERVAL_SECS", "30"),
                ("PIPELINE_ROLES", "alert, persistence"),
                ("KAFKA_SASL_USERNAME", "svc"),
            ]))
            .unwrap();

        assert_eq!(config.event_log.broker, "broker:9093");
        assert_eq!(config.price_source.api_key.as_deref(), Some("secret"));
        assert_eq!(config.fetcher.interval_secs, 30);
        assert_eq!(config.roles, vec![Role::Alert, Role::Persistence]);
        assert_eq!(config.event_log.sasl_username.as_deref(), Some("svc"));
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_env(env(&[("FETCH_INTERVAL_SECS", "soon")])),
            Err(ConfigError::Invalid { field: "FETCH_INTERVAL_SECS", .. })
        ));
        assert!(config.apply_env(env(&[("PIPELINE_ROLES", "alert,trader")])).is_err());
    }

    // ============= Validation =============

    #[test]
    fn test_validate_interval() {
        let mut config = with_key();
        config.fetcher.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_windows() {
        let mut config = with_key();
        config.signal.short_window = 25;
        assert!(config.validate().is_err());

        let mut config = with_key();
        config.signal.window_capacity = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backend_and_groups() {
        let mut config = with_key();
        config.event_log.backend = "rabbit".to_string();
        assert!(config.validate().is_err());

        let mut config = with_key();
        config.groups.daily_analytics = config.groups.alert.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_watchlist_threshold() {
        let mut config = with_key();
        config.watchlist.push(WatchEntry {
            user_id: 1,
            symbol: "AAPL".to_string(),
            threshold_price: dec!(0),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backoff() {
        for backoff in ["jitter: .nan", "jitter: 1.5", "jitter: -0.1", "multiplier: 0.5", "multiplier: .inf"] {
            let yaml = format!("price_source:\n  api_key: demo\nbackoff:\n  {}\n", backoff);
            let config = AppConfig::from_yaml(&yaml).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { field: "backoff", .. })),
                "accepted {}",
                backoff
            );
        }

        let config = AppConfig::from_yaml("price_source:\n  api_key: demo\nbackoff:\n  jitter: 1.0\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse(" Daily "), Some(Role::Daily));
        assert_eq!(Role::parse("signal"), Some(Role::Signal));
        assert_eq!(Role::parse("risk"), None);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.fetch_interval().as_secs(), 60);
        assert_eq!(config.shutdown_grace().as_secs(), 10);
    }
}
