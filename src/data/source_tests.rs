//! Unit tests for price sources and Alpha Vantage quote parsing.

#[cfg(test)]
mod source_tests {
    use rust_decimal_macros::dec;

    use crate::config::PriceSourceConfig;
    use crate::data::alpha_vantage::{AlphaVantageSource, QuoteResponse};
    use crate::data::source::{PriceSource, StaticPriceSource};
    use crate::error::{ConfigError, SourceError};

    fn parse(json: &str) -> QuoteResponse {
        serde_json::from_str(json).unwrap()
    }

    // ============= Alpha Vantage Parsing =============

    #[test]
    fn test_global_quote_price() {
        let body = r#"{"Global Quote": {"01. symbol": "IBM", "05. price": "187.2500", "07. latest trading day": "2024-03-01"}}"#;
        assert_eq!(parse(body).into_price("IBM").unwrap(), dec!(187.25));
    }

    #[test]
    fn test_rate_limit_note() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        assert!(matches!(
            parse(body).into_price("IBM"),
            Err(SourceError::RateLimited { .. })
        ));

        let body = r#"{"Information": "daily limit reached"}"#;
        assert!(matches!(
            parse(body).into_price("IBM"),
            Err(SourceError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_empty_quote() {
        assert!(matches!(
            parse(r#"{"Global Quote": {}}"#).into_price("NOPE"),
            Err(SourceError::EmptyQuote { .. })
        ));
        assert!(matches!(
            parse("{}").into_price("NOPE"),
            Err(SourceError::EmptyQuote { .. })
        ));
    }

    #[test]
    fn test_unparseable_price() {
        let body = r#"{"Global Quote": {"01. symbol": "IBM", "05. price": "n/a"}}"#;
        assert!(matches!(
            parse(body).into_price("IBM"),
            Err(SourceError::Parse { ref raw, .. }) if raw == "n/a"
        ));
    }

    #[test]
    fn test_source_requires_api_key() {
        let config = PriceSourceConfig::default();
        assert!(matches!(
            AlphaVantageSource::new(&config),
            Err(ConfigError::Missing(_))
        ));

        let config = PriceSourceConfig {
            api_key: Some("demo".to_string()),
            ..PriceSourceConfig::default()
        };
        assert_eq!(AlphaVantageSource::new(&config).unwrap().name(), "alpha_vantage");
    }

    // ============= Static Source =============

    #[tokio::test]
    async fn test_static_source_replays_then_repeats() {
        let source = StaticPriceSource::with_prices("AAPL", &[dec!(1), dec!(2)]);
        assert_eq!(source.fetch("AAPL").await.unwrap(), dec!(1));
        assert_eq!(source.fetch("AAPL").await.unwrap(), dec!(2));
        assert_eq!(source.fetch("AAPL").await.unwrap(), dec!(2));
        assert_eq!(source.calls("AAPL"), 3);
    }

    #[tokio::test]
    async fn test_static_source_scripted_rate_limit() {
        let source = StaticPriceSource::new();
        source.push_rate_limited("AAPL");
        source.push_price("AAPL", dec!(10));

        assert!(source.fetch("AAPL").await.is_err());
        assert_eq!(source.fetch("AAPL").await.unwrap(), dec!(10));
        assert!(matches!(
            source.fetch("MSFT").await,
            Err(SourceError::NotFound { .. })
        ));
    }
}
