//! Batch behaviour: worker pool, aggregation and retry timing.

mod common;

use common::{call_log, orchestrator, Backends, Behaviour, FakeDownloader};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vidpipe::artifact::Locator;
use vidpipe::checkpoint::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
use vidpipe::error::VidpipeError;
use vidpipe::job::{parse_url_list, Job, Stage};
use vidpipe::report::ReportBuilder;
use vidpipe::retry::RetryPolicy;
use vidpipe::scheduler::WorkerPool;
use vidpipe::stage::FailureKind;

const URLS: &str = "\
# weekly batch
https://example.com/talks/one.mp3
https://example.com/talks/two.mp3
https://example.com/talks/broken-three.mp3
https://example.com/talks/four.mp3

https://example.com/talks/five.mp3
https://example.com/talks/two.mp3
not a url
";

/// One job failing every strategy leaves the other four untouched.
#[tokio::test(start_paused = true)]
async fn failing_job_does_not_affect_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let log = call_log();
    let mut backends = Backends::healthy(&log);
    let mut primary = FakeDownloader::new("primary", Behaviour::Succeed, log.clone());
    primary.broken_marker = Some("broken".into());
    let mut backup = FakeDownloader::new("backup", Behaviour::Succeed, log.clone());
    backup.broken_marker = Some("broken".into());
    backends.downloaders = vec![Arc::new(primary), Arc::new(backup)];

    let orch = orchestrator(dir.path(), &backends, Arc::new(MemoryCheckpointStore::new()), 3);
    let pool = WorkerPool::new(Arc::new(orch), 2);

    let batch = parse_url_list(URLS);
    assert_eq!(batch.jobs.len(), 5);

    let mut builder = ReportBuilder::new().with_invalid_inputs(batch.invalid);
    let mut results = std::pin::pin!(pool.run(batch.jobs));
    while let Some(result) = results.next().await {
        builder.record(result);
    }
    let report = builder.finish();

    assert_eq!(report.total, 5);
    assert_eq!(report.fully_successful.len(), 4);
    assert!(report.partially_successful.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.invalid_inputs, vec!["not a url".to_string()]);

    let failed = &report.failed[0];
    assert_eq!(failed.position, 2);
    let failure = failed.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Some(Stage::Download));
    assert_eq!(failure.kind(), FailureKind::AllStrategiesExhausted);

    let positions: Vec<usize> = report.fully_successful.iter().map(|j| j.position).collect();
    assert_eq!(positions, vec![0, 1, 3, 4]);

    // Four good downloads on the primary, three retries each on both
    // backends for the broken one.
    assert_eq!(backends.downloaders[0].calls(), 4 + 3);
    assert_eq!(backends.downloaders[1].calls(), 3);

    let usage = report
        .strategy_usage
        .iter()
        .find(|u| u.stage == Stage::Download && u.strategy == "primary")
        .unwrap();
    assert_eq!((usage.attempts, usage.successes), (7, 4));
}

/// Two spellings of one video collapse into a single job, and jobs that do
/// share a key still download into separate staging directories.
#[tokio::test(start_paused = true)]
async fn same_video_under_two_urls_does_not_collide() {
    let short = "https://youtu.be/dQw4w9WgXcQ";
    let long = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    let batch = parse_url_list(&format!("{}\n{}\n", short, long));
    assert_eq!(batch.jobs.len(), 1);
    assert_eq!(batch.duplicates, vec![long.to_string()]);

    let dir = tempfile::tempdir().unwrap();
    let log = call_log();
    let mut backends = Backends::healthy(&log);
    let mut slow = FakeDownloader::new("dl", Behaviour::Succeed, log.clone());
    slow.delay = Some(Duration::from_secs(5));
    backends.downloaders = vec![Arc::new(slow)];

    let orch = orchestrator(dir.path(), &backends, Arc::new(MemoryCheckpointStore::new()), 1);
    let pool = WorkerPool::new(Arc::new(orch), 2);

    let jobs = vec![Job::new(short, 0), Job::new(long, 1)];
    assert_eq!(jobs[0].key, jobs[1].key);
    let results = pool.run_all(jobs).await;

    for result in &results {
        assert!(result.is_done(), "{} failed: {:?}", result.url, result.failure);
    }
    assert_eq!(backends.downloaders[0].calls(), 2);
    let leftovers = std::fs::read_dir(dir.path().join(".staging")).unwrap().count();
    assert_eq!(leftovers, 0);
}

/// Concurrent jobs sharing one SQLite file each end up with exactly their
/// own stages recorded.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_jobs_share_one_checkpoint_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("checkpoints.db");
    let log = call_log();
    let mut backends = Backends::healthy(&log);
    let mut downloader = FakeDownloader::new("dl", Behaviour::Succeed, log.clone());
    downloader.broken_marker = Some("broken".into());
    backends.downloaders = vec![Arc::new(downloader)];

    let urls: Vec<String> = (0..12)
        .map(|i| {
            if i % 5 == 3 {
                format!("https://example.com/talks/broken-{}.mp3", i)
            } else {
                format!("https://example.com/talks/{}.mp3", i)
            }
        })
        .collect();
    let batch = parse_url_list(&urls.join("\n"));
    assert_eq!(batch.jobs.len(), urls.len());

    {
        let store: Arc<dyn CheckpointStore> = Arc::new(SqliteCheckpointStore::new(&db).unwrap());
        let orch = orchestrator(dir.path(), &backends, store, 1);
        let results = WorkerPool::new(Arc::new(orch), 4).run_all(batch.jobs.clone()).await;
        assert_eq!(results.len(), urls.len());
    }

    let store = SqliteCheckpointStore::new(&db).unwrap();
    assert_eq!(store.list_records().await.unwrap().len(), urls.len());

    for job in &batch.jobs {
        let record = store.get_record(&job.url).await.unwrap().unwrap();
        if job.url.contains("broken") {
            assert!(record.stage_artifacts.is_empty(), "{}", job.url);
            assert_eq!(record.failed_stage, Some(Stage::Download));
        } else {
            let expected: BTreeMap<Stage, Locator> = [
                (Stage::Download, Locator::download(&job.key, "mp3")),
                (Stage::Transcription, Locator::transcription(&job.key)),
                (Stage::Summary, Locator::summary(&job.key)),
            ]
            .into_iter()
            .collect();
            assert_eq!(record.stage_artifacts, expected, "{}", job.url);
            assert_eq!(record.title, Some(format!("Title {}", job.key)));
            assert!(record.last_error.is_none());
        }
    }
}

/// Even a batch where everything fails produces a complete report.
#[tokio::test(start_paused = true)]
async fn all_failed_batch_still_reports() {
    let dir = tempfile::tempdir().unwrap();
    let log = call_log();
    let mut backends = Backends::healthy(&log);
    backends.downloaders = vec![Arc::new(FakeDownloader::new("dl", Behaviour::AlwaysFail, log.clone()))];

    let orch = orchestrator(dir.path(), &backends, Arc::new(MemoryCheckpointStore::new()), 2);
    let pool = WorkerPool::new(Arc::new(orch), 3);

    let results = pool.run_all(parse_url_list(URLS).jobs).await;
    let mut builder = ReportBuilder::new();
    results.into_iter().for_each(|r| builder.record(r));
    let report = builder.finish();

    assert_eq!(report.failed.len(), 5);
    assert!(!report.all_succeeded());
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["failed"].as_array().unwrap().len(), 5);
}

/// Waits follow base * n, with rate limits waiting twice as long.
#[tokio::test(start_paused = true)]
async fn retry_backoff_is_linear() {
    let policy = RetryPolicy::new(4, Duration::from_secs(5));
    let mut calls = 0;
    let start = Instant::now();

    let outcome = policy
        .run("backoff", || {
            calls += 1;
            let n = calls;
            async move {
                match n {
                    1 => Err(VidpipeError::Download("reset by peer".into())),
                    2 => Err(VidpipeError::RateLimited("429".into())),
                    3 => Err(VidpipeError::Download("reset by peer".into())),
                    _ => Ok(n),
                }
            }
        })
        .await;

    assert_eq!(outcome.result.unwrap(), 4);
    let delays: Vec<u64> = outcome.attempts.iter().map(|a| a.delay_before.as_secs()).collect();
    // 5 * 1, then 5 * 2 doubled for the rate limit, then 5 * 3.
    assert_eq!(delays, vec![0, 5, 20, 15]);
    assert_eq!(start.elapsed(), Duration::from_secs(40));
}
