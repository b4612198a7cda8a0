//! Run summary round-trip into a targeted retry pass

use crate::support::{example_descriptor, FakeBehavior, FakeFetcher};
use chrono::Duration;
use mapillary_sequence_downloader::downloader::{DownloadOrchestrator, OrchestratorConfig};
use mapillary_sequence_downloader::downloader::RunSummary;
use mapillary_sequence_downloader::output::SequenceLayout;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn failed_ids_from_a_saved_summary_drive_a_second_pass() {
    let dir = tempfile::tempdir().unwrap();

    let mut descriptors = vec![
        example_descriptor("good"),
        example_descriptor("bad-1"),
        example_descriptor("bad-2"),
    ];
    for (i, d) in descriptors.iter_mut().enumerate() {
        d.captured_at += Duration::seconds(i as i64);
    }
    let layout = SequenceLayout::for_batch(dir.path(), "seqExample", &descriptors).unwrap();

    // First pass: two images fail.
    let flaky = Arc::new(
        FakeFetcher::new()
            .with_behavior("bad-1", FakeBehavior::FailRetryable)
            .with_behavior("bad-2", FakeBehavior::FailTerminal),
    );
    let orchestrator = DownloadOrchestrator::new(flaky, OrchestratorConfig::default());
    let summary = orchestrator
        .run(descriptors.clone(), &layout)
        .await
        .unwrap();
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed_count(), 2);

    summary.save(&layout.summary_path()).unwrap();

    // Retry pass: restrict to the failed subset of the saved report, as the
    // CLI's --retry-failed flag does.
    let loaded = RunSummary::load(&layout.summary_path()).unwrap();
    let retry_ids: HashSet<String> = loaded.failed_ids().into_iter().collect();
    assert_eq!(retry_ids.len(), 2);
    assert!(!retry_ids.contains("good"));

    let retry_batch: Vec<_> = descriptors
        .iter()
        .filter(|d| retry_ids.contains(&d.image_id))
        .cloned()
        .collect();

    let healthy = Arc::new(FakeFetcher::new());
    let orchestrator = DownloadOrchestrator::new(healthy.clone(), OrchestratorConfig::default());
    let retry_summary = orchestrator.run(retry_batch, &layout).await.unwrap();

    assert_eq!(retry_summary.downloaded, 2);
    assert_eq!(retry_summary.failed_count(), 0);
    assert_eq!(
        healthy.fetch_count(),
        2,
        "the already-downloaded image must not be fetched again"
    );
}
