//! Concurrent lifecycle calls

use anyhow::Result;
use futures::future::join_all;
use sshfs_volume::invoker::ScriptedInvoker;
use sshfs_volume_e2e::{assert_count, assert_persisted_count, TestHarness};
use std::time::Duration;

const CONSUMERS: usize = 32;

/// Racing first mounts must establish exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_first_mounts() -> Result<()> {
    let harness = TestHarness::with_invoker(ScriptedInvoker::with_delay(Duration::from_millis(25)))?;
    harness.create("v", "u@h:/p")?;

    let tasks = (0..CONSUMERS).map(|i| {
        let m = harness.manager().clone();
        tokio::spawn(async move { m.mount("v", &format!("c{}", i)).await })
    });
    for joined in join_all(tasks).await {
        joined??;
    }

    assert_eq!(harness.invoker().establish_count(), 1);
    assert_count(harness.manager(), "v", CONSUMERS as u32)?;
    assert_persisted_count(&harness.state_path(), "v", CONSUMERS as u64)?;
    Ok(())
}

/// Racing last unmounts must tear down exactly once and never go negative
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_releases() -> Result<()> {
    let harness = TestHarness::with_invoker(ScriptedInvoker::with_delay(Duration::from_millis(5)))?;
    harness.create("v", "u@h:/p")?;
    for i in 0..CONSUMERS {
        harness.manager().mount("v", &format!("c{}", i)).await?;
    }

    // One more release than there are consumers
    let tasks = (0..=CONSUMERS).map(|i| {
        let m = harness.manager().clone();
        tokio::spawn(async move { m.unmount("v", &format!("c{}", i)).await })
    });
    let results = join_all(tasks).await;
    let failed = results
        .into_iter()
        .map(|joined| joined.map_err(anyhow::Error::from))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|r| r.is_err())
        .count();

    assert_eq!(failed, 1);
    assert_eq!(harness.invoker().teardown_count(), 1);
    assert_count(harness.manager(), "v", 0)?;
    Ok(())
}

/// Interleaved mounts and unmounts leave the count at mounts minus unmounts
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_traffic() -> Result<()> {
    let harness = TestHarness::with_invoker(ScriptedInvoker::with_delay(Duration::from_millis(2)))?;
    harness.create("v", "u@h:/p")?;

    let tasks = (0..CONSUMERS).map(|i| {
        let m = harness.manager().clone();
        tokio::spawn(async move {
            let id = format!("c{}", i);
            m.mount("v", &id).await?;
            if i % 2 == 0 {
                m.unmount("v", &id).await?;
            }
            Ok::<_, sshfs_volume::VolumeError>(())
        })
    });
    for joined in join_all(tasks).await {
        joined??;
    }

    assert_count(harness.manager(), "v", (CONSUMERS / 2) as u32)?;
    assert_eq!(
        harness.invoker().establish_count(),
        harness.invoker().teardown_count() + 1
    );
    assert_eq!(harness.invoker().max_in_flight(), 1);
    Ok(())
}

/// Volumes on different endpoints mount in parallel
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_volumes_overlap() -> Result<()> {
    let harness = TestHarness::with_invoker(ScriptedInvoker::with_delay(Duration::from_millis(200)))?;
    for i in 0..4 {
        harness.create(&format!("v{}", i), &format!("u@h:/p{}", i))?;
    }

    let tasks = (0..4).map(|i| {
        let m = harness.manager().clone();
        tokio::spawn(async move { m.mount(&format!("v{}", i), "c").await })
    });
    for joined in join_all(tasks).await {
        joined??;
    }

    assert_eq!(harness.invoker().establish_count(), 4);
    assert!(harness.invoker().max_in_flight() > 1);
    Ok(())
}

/// Reads are served while a slow mount is in progress
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reads_during_slow_mount() -> Result<()> {
    let harness = TestHarness::with_invoker(ScriptedInvoker::with_delay(Duration::from_millis(300)))?;
    harness.create("v", "u@h:/p")?;

    let m = harness.manager().clone();
    let mount = tokio::spawn(async move { m.mount("v", "c1").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reads = tokio::time::timeout(Duration::from_millis(100), async {
        (harness.manager().list(), harness.manager().get("v"))
    })
    .await?;
    assert_eq!(reads.0.len(), 1);
    assert_eq!(reads.1?.reference_count, 0);

    mount.await??;
    assert_count(harness.manager(), "v", 1)?;
    Ok(())
}
