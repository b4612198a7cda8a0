//! Resumption: interrupted batches re-run safely

use crate::support::{example_descriptor, FakeFetcher};
use chrono::Duration;
use mapillary_sequence_downloader::downloader::{DownloadOrchestrator, OrchestratorConfig};
use mapillary_sequence_downloader::output::SequenceLayout;
use mapillary_sequence_downloader::ImageDescriptor;
use std::sync::Arc;

fn batch(count: usize) -> Vec<ImageDescriptor> {
    (0..count)
        .map(|i| {
            let mut d = example_descriptor(&format!("img{i}"));
            d.captured_at += Duration::seconds(i as i64);
            d
        })
        .collect()
}

#[tokio::test]
async fn second_run_over_intact_destination_performs_zero_fetches() {
    let dir = tempfile::tempdir().unwrap();
    let descriptors = batch(4);
    let layout = SequenceLayout::for_batch(dir.path(), "seqExample", &descriptors).unwrap();

    let fetcher = Arc::new(FakeFetcher::new());
    let orchestrator = DownloadOrchestrator::new(fetcher.clone(), OrchestratorConfig::default());

    let first = orchestrator
        .run(descriptors.clone(), &layout)
        .await
        .unwrap();
    assert_eq!(first.downloaded, 4);
    assert_eq!(fetcher.fetch_count(), 4);

    let second = orchestrator.run(descriptors, &layout).await.unwrap();
    assert_eq!(second.skipped, 4);
    assert_eq!(second.downloaded, 0);
    assert_eq!(
        fetcher.fetch_count(),
        4,
        "an intact destination must trigger no additional fetches"
    );
}

#[tokio::test]
async fn only_missing_outputs_are_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let descriptors = batch(3);
    let layout = SequenceLayout::for_batch(dir.path(), "seqExample", &descriptors).unwrap();

    let fetcher = Arc::new(FakeFetcher::new());
    let orchestrator = DownloadOrchestrator::new(fetcher.clone(), OrchestratorConfig::default());
    orchestrator
        .run(descriptors.clone(), &layout)
        .await
        .unwrap();

    // Simulate a lost output.
    let lost = layout.image_path(descriptors[1].captured_at);
    std::fs::remove_file(&lost).unwrap();

    let second = orchestrator.run(descriptors, &layout).await.unwrap();
    assert_eq!(second.downloaded, 1);
    assert_eq!(second.skipped, 2);
    assert_eq!(fetcher.fetch_count(), 4);
    assert!(lost.exists());
}

#[tokio::test]
async fn partial_file_is_not_mistaken_for_a_finished_output() {
    let dir = tempfile::tempdir().unwrap();
    let descriptors = batch(1);
    let layout = SequenceLayout::for_batch(dir.path(), "seqExample", &descriptors).unwrap();
    layout.ensure_directory().unwrap();

    // A torn write: plausible-looking path, truncated garbage content.
    let target = layout.image_path(descriptors[0].captured_at);
    std::fs::write(&target, &[0xFF, 0xD8, 0x00]).unwrap();

    let fetcher = Arc::new(FakeFetcher::new());
    let orchestrator = DownloadOrchestrator::new(fetcher.clone(), OrchestratorConfig::default());
    let summary = orchestrator.run(descriptors, &layout).await.unwrap();

    assert_eq!(summary.downloaded, 1, "torn output must be replaced");
    assert_eq!(fetcher.fetch_count(), 1);
}
