//! Unit tests for the daily analytics consumer.

#[cfg(test)]
mod daily_analytics_tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::data::store::{MemoryStore, Store};
    use crate::events::PriceEvent;
    use crate::services::consumer::EventHandler;
    use crate::services::daily_analytics::DailyAnalyticsConsumer;

    fn event(secs: i64, price: Decimal) -> PriceEvent {
        let open = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        PriceEvent::new("AAPL", price, open + Duration::seconds(secs)).unwrap()
    }

    #[tokio::test]
    async fn test_min_max_avg_count() {
        let store = MemoryStore::new();
        let consumer = DailyAnalyticsConsumer::new(Arc::new(store.clone()));

        for (i, p) in [dec!(100), dec!(105), dec!(95)].into_iter().enumerate() {
            consumer.handle(&event(i as i64, p)).await.unwrap();
        }

        let row = store.daily("AAPL", event(0, dec!(1)).day()).await.unwrap().unwrap();
        assert_eq!(
            (row.min_price, row.max_price, row.avg_price, row.sample_count),
            (dec!(95), dec!(105), dec!(100), 3)
        );
    }

    #[tokio::test]
    async fn test_invariants_under_shuffled_and_duplicated_input() {
        let prices = [
            dec!(101.37),
            dec!(99.12),
            dec!(100.01),
            dec!(103.99),
            dec!(98.5),
            dec!(100.333),
        ];
        let events: Vec<PriceEvent> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| event(i as i64, *p))
            .collect();
        let orders: [&[usize]; 3] = [
            &[0, 1, 2, 3, 4, 5],
            &[5, 3, 3, 1, 0, 2, 4, 0],
            &[2, 2, 2, 4, 1, 5, 0, 3, 5],
        ];

        for order in orders {
            let store = MemoryStore::new();
            let consumer = DailyAnalyticsConsumer::new(Arc::new(store.clone()));
            for &i in order {
                consumer.handle(&events[i]).await.unwrap();
                let row = store
                    .daily("AAPL", events[i].day())
                    .await
                    .unwrap()
                    .unwrap();
                assert!(row.min_price <= row.avg_price);
                assert!(row.avg_price <= row.max_price);
            }
            let row = store.daily("AAPL", events[0].day()).await.unwrap().unwrap();
            assert_eq!(row.sample_count, 6);
            assert_eq!(row.min_price, dec!(98.5));
            assert_eq!(row.max_price, dec!(103.99));
        }
    }

    #[tokio::test]
    async fn test_overflowing_samples_are_skipped_without_poisoning_store() {
        let store = MemoryStore::new();
        let consumer = DailyAnalyticsConsumer::new(Arc::new(store.clone()));
        // bypasses validation to reach the arithmetic guard
        let huge = Decimal::from_i128_with_scale(10i128.pow(28), 0);
        let base = event(0, dec!(1)).observed_at;

        let mut rejected = 0;
        for i in 0..10 {
            let e = PriceEvent {
                symbol: "BIG".to_string(),
                price: huge,
                observed_at: base + Duration::seconds(i),
            };
            if let Err(err) = consumer.handle(&e).await {
                assert!(!err.is_transient());
                rejected += 1;
            }
        }

        let row = store.daily("BIG", base.date_naive()).await.unwrap().unwrap();
        assert_eq!(row.sample_count, 7);
        assert_eq!(rejected, 3);
        assert!(row.min_price <= row.avg_price && row.avg_price <= row.max_price);
    }

    #[tokio::test]
    async fn test_new_day_compacts_old_dedup_keys() {
        let store = MemoryStore::new();
        let consumer = DailyAnalyticsConsumer::new(Arc::new(store.clone()));
        let first = event(0, dec!(100));
        let next_day = event(86_400, dec!(101));
        let later = event(3 * 86_400, dec!(102));

        consumer.handle(&first).await.unwrap();
        consumer.handle(&next_day).await.unwrap();
        // still inside the retention: the redelivery is recognised
        consumer.handle(&first).await.unwrap();
        consumer.handle(&later).await.unwrap();

        // the first day was compacted when the later day arrived
        assert_eq!(store.compact_daily_before(next_day.day()).await.unwrap(), 0);
        assert_eq!(store.compact_daily_before(later.day()).await.unwrap(), 1);
        let row = store.daily("AAPL", first.day()).await.unwrap().unwrap();
        assert_eq!(row.sample_count, 1);
        let row = store.daily("AAPL", later.day()).await.unwrap().unwrap();
        assert_eq!(row.sample_count, 1);
    }

    #[tokio::test]
    async fn test_outage_then_retry_counts_once() {
        let store = MemoryStore::new();
        let consumer = DailyAnalyticsConsumer::new(Arc::new(store.clone()));
        store.fail_next_writes(1);

        let e = event(0, dec!(100));
        assert!(consumer.handle(&e).await.unwrap_err().is_transient());
        consumer.handle(&e).await.unwrap();

        let row = store.daily("AAPL", e.day()).await.unwrap().unwrap();
        assert_eq!(row.sample_count, 1);
        assert_eq!(consumer.name(), "DAILY");
    }
}
