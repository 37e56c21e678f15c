//! Adaptive scanner behaviour against the scripted store

mod helpers;

use chrono::Duration;
use std::sync::Arc;

use daq_downloader::scanner::{AdaptiveScanner, ScanError};
use daq_downloader::store::{check_connectivity, ProbeError};
use helpers::{dataset, hour, range, scan_params, Call, FakeStore};

#[tokio::test]
async fn test_continuous_data_yields_one_run_via_aggregate() {
    let store = Arc::new(FakeStore::new().with_data("WFR25", range(0, 2)));
    let scanner = AdaptiveScanner::new(store.clone(), scan_params());

    let report = scanner.scan(&dataset("WFR25", range(0, 24))).await.unwrap();

    assert_eq!(report.windows.len(), 1);
    let window = &report.windows[0];
    assert_eq!(window.start, hour(0));
    assert_eq!(window.end, hour(2));
    assert_eq!(window.bins, 2);
    assert_eq!(window.row_count, Some(2 * 3600));
    assert_eq!(report.aggregate_chunks, 1);
    assert_eq!(report.subdivided_chunks, 0);
    assert!(store.exists_probes("WFR25").is_empty());
}

#[tokio::test]
async fn test_subdivision_prunes_empty_half_after_one_probe() {
    let store = Arc::new(
        FakeStore::new()
            .with_data("WFR25", helpers::range(1, 3))
            .failing_aggregate("WFR25", ProbeError::ResourceExhausted("plan too large".to_string())),
    );
    let scanner = AdaptiveScanner::new(store.clone(), scan_params());

    let report = scanner.scan(&dataset("WFR25", range(0, 24))).await.unwrap();

    let probes = store.exists_probes("WFR25");
    assert_eq!(probes[0], range(0, 12));
    assert_eq!(probes[1], range(12, 24));
    for probe in &probes[2..] {
        assert!(
            probe.end <= hour(12),
            "probed {} after the empty half was pruned",
            probe
        );
    }

    assert_eq!(report.subdivided_chunks, 1);
    assert_eq!(report.probes, probes.len());
    assert!(!report.windows.is_empty());
    for window in &report.windows {
        assert!(window.end <= hour(12));
        assert!(window.end - window.start <= Duration::hours(12));
        assert_eq!(window.row_count, None);
    }
    assert!(report.windows.first().unwrap().start <= hour(1));
    assert!(report.windows.last().unwrap().end >= hour(3));
}

#[tokio::test]
async fn test_subdivision_on_timeout() {
    let store = Arc::new(
        FakeStore::new()
            .with_data("WFR25", range(5, 6))
            .failing_aggregate("WFR25", ProbeError::Timeout(std::time::Duration::from_secs(30))),
    );
    let scanner = AdaptiveScanner::new(store.clone(), scan_params());

    let report = scanner.scan(&dataset("WFR25", range(0, 8))).await.unwrap();

    // 8h -> 4h -> 2h -> 1h halves line up with the data hour exactly
    assert_eq!(report.windows.len(), 1);
    assert_eq!(report.windows[0].start, hour(5));
    assert_eq!(report.windows[0].end, hour(6));
    assert_eq!(report.windows[0].bins, 1);
}

#[tokio::test]
async fn test_empty_candidate_range_is_not_an_error() {
    let store = Arc::new(FakeStore::new().with_data("WFR25", range(0, 2)));
    let scanner = AdaptiveScanner::new(store.clone(), scan_params());

    let report = scanner.scan(&dataset("WFR25", range(4, 4))).await.unwrap();

    assert!(report.windows.is_empty());
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_range_without_data_yields_no_windows() {
    let store = Arc::new(FakeStore::new());
    let scanner = AdaptiveScanner::new(store, scan_params());

    let report = scanner.scan(&dataset("WFR25", range(0, 48))).await.unwrap();
    assert!(report.windows.is_empty());
}

#[tokio::test]
async fn test_gap_tolerance_joins_short_dropouts() {
    let store = Arc::new(
        FakeStore::new()
            .with_data("WFR25", range(0, 2))
            .with_data("WFR25", range(3, 4))
            .with_data("WFR25", range(8, 9)),
    );

    let strict = AdaptiveScanner::new(store.clone(), scan_params());
    let report = strict.scan(&dataset("WFR25", range(0, 24))).await.unwrap();
    assert_eq!(report.windows.len(), 3);

    let mut params = scan_params();
    params.gap_tolerance = 1;
    let tolerant = AdaptiveScanner::new(store, params);
    let report = tolerant.scan(&dataset("WFR25", range(0, 24))).await.unwrap();
    assert_eq!(report.windows.len(), 2);
    assert_eq!(report.windows[0].start, hour(0));
    assert_eq!(report.windows[0].end, hour(4));
    assert_eq!(report.windows[0].bins, 3);
}

#[tokio::test]
async fn test_counts_omitted_when_disabled() {
    let store = Arc::new(FakeStore::new().with_data("WFR25", range(0, 2)));
    let mut params = scan_params();
    params.include_counts = false;
    let scanner = AdaptiveScanner::new(store, params);

    let report = scanner.scan(&dataset("WFR25", range(0, 24))).await.unwrap();
    assert_eq!(report.windows[0].row_count, None);
    assert_eq!(report.windows[0].bins, 2);
}

#[tokio::test]
async fn test_windows_spanning_chunks_are_merged() {
    let store = Arc::new(FakeStore::new().with_data("WFR25", range(20, 28)));
    let mut params = scan_params();
    params.chunk = Duration::days(1);
    let scanner = AdaptiveScanner::new(store.clone(), params);

    let report = scanner.scan(&dataset("WFR25", range(0, 48))).await.unwrap();

    assert_eq!(report.aggregate_chunks, 2);
    assert_eq!(report.windows.len(), 1);
    assert_eq!(report.windows[0].start, hour(20));
    assert_eq!(report.windows[0].end, hour(28));
    assert_eq!(report.windows[0].row_count, Some(8 * 3600));

    let aggregates = store
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Aggregate(..)))
        .count();
    assert_eq!(aggregates, 2);
}

#[tokio::test]
async fn test_hard_error_aborts_dataset() {
    let store = Arc::new(FakeStore::new().broken("WFR25"));
    let scanner = AdaptiveScanner::new(store, scan_params());

    let result = scanner.scan(&dataset("WFR25", range(0, 24))).await;
    assert!(matches!(
        result,
        Err(ScanError::Probe {
            source: ProbeError::Query { status: 400, .. },
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_transient_probe_failures_are_retried() {
    let store = Arc::new(
        FakeStore::new()
            .with_data("WFR25", range(0, 1))
            .failing_aggregate("WFR25", ProbeError::ResourceExhausted("too large".to_string()))
            .flaky_exists("WFR25", 1),
    );
    let scanner = AdaptiveScanner::new(store, scan_params());

    let report = scanner.scan(&dataset("WFR25", range(0, 4))).await.unwrap();
    assert_eq!(report.windows.len(), 1);
    assert_eq!(report.windows[0].start, hour(0));
}

#[tokio::test]
async fn test_rescanning_unchanged_data_is_identical() {
    let store = Arc::new(
        FakeStore::new()
            .with_data("WFR25", range(2, 5))
            .with_data("WFR25", range(10, 11)),
    );
    let scanner = AdaptiveScanner::new(store, scan_params());
    let ds = dataset("WFR25", range(0, 24));

    let first = scanner.scan(&ds).await.unwrap();
    let second = scanner.scan(&ds).await.unwrap();
    assert_eq!(first.windows, second.windows);
}

#[tokio::test]
async fn test_connectivity_check_probes_last_hour() {
    let store = FakeStore::new().with_data("WFR25", range(1, 2));
    let ds = dataset("WFR25", range(0, 24));

    let recent = check_connectivity(&store, &ds, hour(2)).await.unwrap();
    assert!(recent);
    assert_eq!(store.exists_probes("WFR25"), vec![range(1, 2)]);

    // Reachable but quiet is not an error
    let recent = check_connectivity(&store, &ds, hour(10)).await.unwrap();
    assert!(!recent);
}

#[tokio::test]
async fn test_connectivity_check_reports_store_error() {
    let store = FakeStore::new().broken("WFR25");
    let ds = dataset("WFR25", range(0, 24));

    let result = check_connectivity(&store, &ds, hour(2)).await;

    assert!(matches!(result, Err(ProbeError::Query { status: 400, .. })));
}

#[tokio::test]
async fn test_tolerance_beyond_i32_still_merges_adjacent_bins() {
    let store = Arc::new(FakeStore::new().with_data("WFR25", range(0, 3)));
    let mut params = scan_params();
    params.gap_tolerance = 3_000_000_000;
    let scanner = AdaptiveScanner::new(store, params);

    let report = scanner.scan(&dataset("WFR25", range(0, 24))).await.unwrap();

    assert_eq!(report.windows.len(), 1);
    assert_eq!(report.windows[0].range(), range(0, 3));
}
