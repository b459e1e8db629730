//! 🧪 End-to-end runs against the in-memory bucket: discovery, streaming, flushing,
//! dry-run, and every way it can fall over.

use std::io::{Read, Write};

use anyhow::Result;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use lcx::app_config::{AggregateEvent, AmbientConfig, AppConfig, RuntimeConfig, ThresholdRule};
use lcx::backends::{InMemoryStore, S3StoreConfig, StoreBackend};
use lcx::common::ObjectLocation;
use lcx::errors::CompactError;

const DATE: &str = "2024-01-01";
const LINE_BYTES: usize = 100;

fn config(dry_run: bool, max_bundle_size_bytes: u64, threshold_rule: ThresholdRule) -> AppConfig {
    AppConfig {
        source: ObjectLocation::new("raw", "logs/"),
        destination: ObjectLocation::new("compacted", "bundles/"),
        date: DATE.to_string(),
        dry_run,
        only_partitions: Vec::new(),
        runtime: RuntimeConfig {
            max_bundle_size_bytes,
            threshold_rule,
            ..RuntimeConfig::default()
        },
        store: S3StoreConfig::default(),
    }
}

fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(content).expect("💀 gzip into a Vec cannot fail");
    encoder.finish().expect("💀 gzip into a Vec cannot fail")
}

fn gunzip(payload: &[u8]) -> Vec<u8> {
    let mut content = Vec::new();
    MultiGzDecoder::new(payload)
        .read_to_end(&mut content)
        .expect("💀 bundles should always be valid gzip");
    content
}

/// 📏 Exactly `LINE_BYTES` bytes, newline included, unique per (app, index).
fn line(app: &str, index: usize) -> String {
    format!("{:<width$}\n", format!("{app} line {index:04}"), width = LINE_BYTES - 1)
}

fn fragment_key(app: &str, index: usize) -> String {
    format!("logs/{app}/{DATE}/fragment-{index:04}.gz")
}

/// 🪣 `count` gzipped one-line fragments for `app` on `DATE`.
async fn seed(store: &InMemoryStore, app: &str, count: usize) {
    for i in 0..count {
        store
            .insert("raw", &fragment_key(app, i), gzip(line(app, i).as_bytes()))
            .await;
    }
}

async fn bundle_keys(store: &InMemoryStore, app: &str) -> Vec<String> {
    store
        .keys("compacted", &format!("bundles/{app}/{DATE}/"))
        .await
}

async fn decoded_bundles(store: &InMemoryStore, app: &str) -> Vec<Vec<u8>> {
    let mut bundles = Vec::new();
    for key in bundle_keys(store, app).await {
        let payload = store
            .object("compacted", &key)
            .await
            .expect("💀 a listed bundle should exist");
        bundles.push(gunzip(&payload));
    }
    bundles
}

async fn run(store: &InMemoryStore, app_config: AppConfig) -> Result<lcx::common::JobReport> {
    lcx::run_with_store(app_config, StoreBackend::InMemory(store.clone())).await
}

#[tokio::test]
async fn the_one_where_twenty_lines_make_four_bundles_of_five() -> Result<()> {
    let the_store = InMemoryStore::new().with_page_size(7);
    seed(&the_store, "api", 20).await;

    let the_report = run(&the_store, config(false, 500, ThresholdRule::Exceeds)).await?;

    assert_eq!(the_report.bundle_count(), 4, "2000 decoded bytes / 500 per bundle");
    assert_eq!(the_report.objects_processed(), 20);
    assert_eq!(
        bundle_keys(&the_store, "api").await,
        vec![
            "bundles/api/2024-01-01/aggregated_001.gz",
            "bundles/api/2024-01-01/aggregated_002.gz",
            "bundles/api/2024-01-01/aggregated_003.gz",
            "bundles/api/2024-01-01/aggregated_004.gz",
        ]
    );
    assert!(
        decoded_bundles(&the_store, "api")
            .await
            .iter()
            .all(|bundle| bundle.len() == 500)
    );
    Ok(())
}

#[tokio::test]
async fn the_one_where_meets_or_exceeds_flushes_one_line_early() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 20).await;

    let the_report = run(&the_store, config(false, 500, ThresholdRule::MeetsOrExceeds)).await?;

    // -- 🧪 400 + 100 reaches 500, so every bundle stops at four lines
    assert_eq!(the_report.bundle_count(), 5);
    assert!(
        decoded_bundles(&the_store, "api")
            .await
            .iter()
            .all(|bundle| bundle.len() == 400)
    );
    Ok(())
}

#[tokio::test]
async fn the_one_where_an_empty_day_produces_no_bundles_at_all() -> Result<()> {
    let the_store = InMemoryStore::new();
    the_store
        .insert("raw", "logs/api/2023-12-31/fragment-0000.gz", gzip(b"yesterday\n"))
        .await;

    let the_report = run(&the_store, config(false, 500, ThresholdRule::Exceeds)).await?;

    assert_eq!(the_report.runs.len(), 1);
    assert_eq!(the_report.bundle_count(), 0);
    assert!(the_store.puts().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn the_one_where_no_byte_is_lost_or_duplicated() -> Result<()> {
    let the_store = InMemoryStore::new().with_page_size(13);
    seed(&the_store, "web", 137).await;
    // -- 🧪 one plain-text fragment and one multi-member gzip fragment in the mix
    the_store
        .insert("raw", &fragment_key("web", 137), line("web", 137))
        .await;
    let mut the_concatenated = gzip(line("web", 138).as_bytes());
    the_concatenated.extend(gzip(line("web", 139).as_bytes()));
    the_store
        .insert("raw", &fragment_key("web", 138), the_concatenated)
        .await;

    run(&the_store, config(false, 1_000, ThresholdRule::Exceeds)).await?;

    let mut the_lines: Vec<String> = decoded_bundles(&the_store, "web")
        .await
        .iter()
        .flat_map(|bundle| {
            String::from_utf8_lossy(bundle)
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    the_lines.sort();
    let the_expected: Vec<String> = (0..140).map(|i| line("web", i).trim_end_matches('\n').to_string()).collect();
    assert_eq!(the_lines, the_expected);
    Ok(())
}

#[tokio::test]
async fn the_one_where_dry_run_reads_everything_and_writes_nothing() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 30).await;

    let the_report = run(&the_store, config(true, 1_000, ThresholdRule::Exceeds)).await?;

    assert!(the_report.dry_run);
    assert_eq!(the_report.bundle_count(), 3);
    assert_eq!(the_report.objects_processed(), 30);
    assert!(the_store.puts().await.is_empty());
    assert!(the_report.runs[0].bundles.iter().all(|b| b.dry_run));
    Ok(())
}

#[tokio::test]
async fn the_one_where_live_mode_puts_exactly_once_per_bundle() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 25).await;

    let the_report = run(&the_store, config(false, 1_000, ThresholdRule::Exceeds)).await?;

    // -- 🧪 two full bundles plus the final flush of the last five lines
    assert_eq!(the_report.bundle_count(), 3);
    assert_eq!(the_store.puts().await.len(), 3);
    assert!(the_store.puts().await.iter().all(|(bucket, _)| bucket == "compacted"));
    Ok(())
}

#[tokio::test]
async fn the_one_where_every_partition_starts_counting_from_one() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 12).await;
    seed(&the_store, "web", 7).await;

    let the_report = run(&the_store, config(false, 500, ThresholdRule::Exceeds)).await?;

    let the_partitions: Vec<&str> = the_report.runs.iter().map(|r| r.partition.as_str()).collect();
    assert_eq!(the_partitions, vec!["api", "web"]);
    assert_eq!(bundle_keys(&the_store, "api").await.len(), 3);
    assert_eq!(
        bundle_keys(&the_store, "web").await,
        vec![
            "bundles/web/2024-01-01/aggregated_001.gz",
            "bundles/web/2024-01-01/aggregated_002.gz",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn the_one_where_only_partitions_leaves_the_rest_alone() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 5).await;
    seed(&the_store, "web", 5).await;
    let mut the_config = config(false, 500, ThresholdRule::Exceeds);
    the_config.only_partitions = vec!["web".to_string(), "nope".to_string()];

    let the_report = run(&the_store, the_config).await?;

    assert_eq!(the_report.runs.len(), 1);
    assert_eq!(the_report.runs[0].partition, "web");
    assert!(bundle_keys(&the_store, "api").await.is_empty());
    assert_eq!(bundle_keys(&the_store, "web").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn the_one_where_object_fifty_of_two_hundred_takes_the_whole_run_down() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 200).await;
    let the_cursed_key = fragment_key("api", 49);
    the_store.fail_get(&the_cursed_key).await;

    let the_error = run(&the_store, config(false, 1_000, ThresholdRule::Exceeds))
        .await
        .expect_err("💀 object 50 was booby-trapped");

    assert_eq!(
        the_error.downcast_ref::<CompactError>(),
        Some(&CompactError::Fetch {
            key: the_cursed_key.clone()
        })
    );
    assert!(format!("{the_error:#}").contains(&the_cursed_key));

    // -- 🧪 no final flush on failure: whatever made it out is a full bundle, never a tail
    let the_bundles = decoded_bundles(&the_store, "api").await;
    assert!(the_bundles.len() < 20);
    assert!(the_bundles.iter().all(|bundle| bundle.len() == 1_000));
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_cursed_listing_is_a_listing_error() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 3).await;
    the_store.fail_list("logs/api/2024-01-01/").await;

    let the_error = run(&the_store, config(false, 500, ThresholdRule::Exceeds))
        .await
        .expect_err("💀 the listing was cursed");

    assert_eq!(
        the_error.downcast_ref::<CompactError>(),
        Some(&CompactError::Listing {
            bucket: "raw".into(),
            prefix: "logs/api/2024-01-01/".into(),
        })
    );
    assert!(the_store.puts().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn the_one_where_discovery_itself_fails() -> Result<()> {
    let the_store = InMemoryStore::new();
    the_store.fail_list("logs/").await;

    let the_error = run(&the_store, config(false, 500, ThresholdRule::Exceeds))
        .await
        .expect_err("💀 discovery was cursed");

    assert!(matches!(
        the_error.downcast_ref::<CompactError>(),
        Some(CompactError::Listing { prefix, .. }) if prefix == "logs/"
    ));
    Ok(())
}

#[tokio::test]
async fn the_one_where_the_second_upload_fails_and_names_its_bundle() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 30).await;
    the_store.fail_puts_after(1).await;

    let the_error = run(&the_store, config(false, 1_000, ThresholdRule::Exceeds))
        .await
        .expect_err("💀 only one put was allowed");

    assert_eq!(
        the_error.downcast_ref::<CompactError>(),
        Some(&CompactError::Upload {
            key: "bundles/api/2024-01-01/aggregated_002.gz".into()
        })
    );
    assert_eq!(
        bundle_keys(&the_store, "api").await,
        vec!["bundles/api/2024-01-01/aggregated_001.gz"]
    );
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_missing_date_never_reaches_the_bucket() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 3).await;
    let mut the_config = config(false, 500, ThresholdRule::Exceeds);
    the_config.date = String::new();

    let the_error = run(&the_store, the_config)
        .await
        .expect_err("💀 no date, no run");

    assert!(matches!(
        the_error.downcast_ref::<CompactError>(),
        Some(CompactError::Config(_))
    ));
    assert_eq!(the_store.list_calls().await, 0);
    Ok(())
}

/// 📜 Every decoded line across the bundles under `prefix` in `bucket`, sorted.
async fn sorted_lines(store: &InMemoryStore, bucket: &str, prefix: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for key in store.keys(bucket, prefix).await {
        let payload = store
            .object(bucket, &key)
            .await
            .expect("💀 a listed bundle should exist");
        let content = String::from_utf8(gunzip(&payload)).expect("💀 test lines are utf-8");
        lines.extend(content.lines().map(str::to_string));
    }
    lines.sort();
    lines
}

#[tokio::test]
async fn the_one_where_bundles_share_the_fragments_bucket_and_are_never_read_back() -> Result<()> {
    // -- 🪣 bucket-root layout: app/<date>/a-NN.gz, bundles go to the event's default folder
    let the_store = InMemoryStore::new().with_page_size(3);
    for i in 0..12 {
        the_store
            .insert("logs", &format!("app/{DATE}/a-{i:02}.gz"), gzip(line("app", i).as_bytes()))
            .await;
    }
    let mut the_config = AggregateEvent::from_json(r#"{"date":"2024-01-01","bucket":"logs","dryRun":false}"#)?
        .into_app_config(AmbientConfig::default())?;
    the_config.runtime.max_bundle_size_bytes = 250;

    let the_first = run(&the_store, the_config.clone()).await?;
    assert_eq!(the_first.runs.len(), 1, "the bundle folder is not an application");
    assert_eq!(the_first.objects_processed(), 12);

    let mut the_expected: Vec<String> = (0..12)
        .map(|i| line("app", i).trim_end_matches('\n').to_string())
        .collect();
    the_expected.sort();
    let the_bundle_prefix = format!("compacted/app/{DATE}/");
    assert_eq!(sorted_lines(&the_store, "logs", &the_bundle_prefix).await, the_expected);

    let the_second = run(&the_store, the_config).await?;
    assert_eq!(the_second.runs.len(), 1);
    assert_eq!(the_second.objects_processed(), 12, "yesterday's bundles are not today's fragments");
    assert_eq!(sorted_lines(&the_store, "logs", &the_bundle_prefix).await, the_expected);
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_destination_inside_a_partition_is_refused_before_any_put() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 3).await;
    let mut the_config = config(false, 500, ThresholdRule::Exceeds);
    the_config.destination = ObjectLocation::new("raw", format!("logs/api/{DATE}/"));

    let the_error = run(&the_store, the_config)
        .await
        .expect_err("💀 bundles would land among their own fragments");

    assert!(matches!(
        the_error.downcast_ref::<CompactError>(),
        Some(CompactError::Config(message)) if message.contains("partition 'api'")
    ));
    assert!(the_store.puts().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn the_one_where_source_and_destination_are_the_same_place() -> Result<()> {
    let the_store = InMemoryStore::new();
    seed(&the_store, "api", 3).await;
    let mut the_config = config(false, 500, ThresholdRule::Exceeds);
    the_config.destination = ObjectLocation::new("raw", "logs/");

    let the_error = run(&the_store, the_config)
        .await
        .expect_err("💀 the destination is the source");

    assert!(matches!(
        the_error.downcast_ref::<CompactError>(),
        Some(CompactError::Config(_))
    ));
    assert_eq!(the_store.list_calls().await, 0);
    Ok(())
}
