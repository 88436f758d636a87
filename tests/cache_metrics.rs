use std::collections::HashSet;
use std::convert::Infallible;
use std::num::NonZeroUsize;
use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde_json::json;
use tech_report_api::cache::{CacheConfig, QueryFilters, ReportCache};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = ReportCache::new(&CacheConfig {
        max_size: NonZeroUsize::new(2).expect("non-zero"),
        ..Default::default()
    });

    // Result cache miss, backend latency, then a hit.
    for _ in 0..2 {
        let rows = cache
            .query("geos", QueryFilters::default())
            .fetch(|| async { Ok::<_, Infallible>(vec![json!({"geo": "ALL"})]) })
            .await
            .expect("infallible");
        assert_eq!(rows.len(), 1);
    }

    // Filling past the ceiling triggers an eviction pass.
    for key in ["a:{}", "b:{}", "c:{}"] {
        cache.results().set(key, Arc::new(Vec::new()));
    }

    // Latest-date memoizer miss then hit.
    for _ in 0..2 {
        let date = cache
            .dates()
            .latest_date("adoption", || async {
                Ok::<_, Infallible>(Some("2024-01-01".to_string()))
            })
            .await
            .expect("infallible");
        assert_eq!(date.as_deref(), Some("2024-01-01"));
    }

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "techreport_cache_hit_total",
        "techreport_cache_miss_total",
        "techreport_cache_evict_total",
        "techreport_cache_entries",
        "techreport_backend_query_ms",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let counter = |name: &str, cache_label: &str| -> u64 {
        snapshot
            .iter()
            .find_map(|(composite_key, _, _, value)| {
                let key = composite_key.key();
                let labelled = key
                    .labels()
                    .any(|label| label.key() == "cache" && label.value() == cache_label);
                match value {
                    DebugValue::Counter(count) if key.name() == name && labelled => Some(*count),
                    _ => None,
                }
            })
            .unwrap_or(0)
    };

    assert_eq!(counter("techreport_cache_hit_total", "result"), 1);
    assert_eq!(counter("techreport_cache_miss_total", "result"), 1);
    assert_eq!(counter("techreport_cache_hit_total", "date"), 1);
    assert_eq!(counter("techreport_cache_miss_total", "date"), 1);
}
