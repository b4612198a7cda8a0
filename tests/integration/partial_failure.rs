//! Partial-failure isolation across a batch

use crate::support::{example_descriptor, FakeBehavior, FakeFetcher};
use chrono::Duration;
use mapillary_sequence_downloader::downloader::{
    DownloadOrchestrator, FailureCategory, OrchestratorConfig,
};
use mapillary_sequence_downloader::output::SequenceLayout;
use std::sync::Arc;

#[tokio::test]
async fn each_failure_class_is_isolated_to_its_own_image() {
    let dir = tempfile::tempdir().unwrap();

    let mut descriptors = vec![
        example_descriptor("ok-1"),
        example_descriptor("no-geometry"),
        example_descriptor("missing"),
        example_descriptor("flaky"),
        example_descriptor("corrupt"),
        example_descriptor("ok-2"),
    ];
    for (i, d) in descriptors.iter_mut().enumerate() {
        d.captured_at += Duration::seconds(i as i64);
    }
    descriptors[1].latitude = None;
    descriptors[1].longitude = None;

    let layout = SequenceLayout::for_batch(dir.path(), "seqExample", &descriptors).unwrap();

    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_behavior("missing", FakeBehavior::FailTerminal)
            .with_behavior("flaky", FakeBehavior::FailRetryable)
            .with_behavior("corrupt", FakeBehavior::ServeGarbage),
    );
    let orchestrator = DownloadOrchestrator::new(fetcher, OrchestratorConfig::default());
    let summary = orchestrator.run(descriptors, &layout).await.unwrap();

    // The two healthy images made it regardless of their neighbors.
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.fetch_failed, 2);
    assert_eq!(summary.metadata_failed, 2);

    let category_of = |id: &str| {
        summary
            .failures
            .iter()
            .find(|f| f.image_id == id)
            .unwrap_or_else(|| panic!("{id} missing from failure list"))
            .category
    };
    assert_eq!(category_of("no-geometry"), FailureCategory::Geometry);
    assert_eq!(category_of("missing"), FailureCategory::FetchTerminal);
    assert_eq!(category_of("flaky"), FailureCategory::FetchRetryable);
    assert_eq!(category_of("corrupt"), FailureCategory::Encoding);
}
