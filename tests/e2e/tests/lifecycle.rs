//! Volume lifecycle scenarios
//!
//! Create, mount, unmount and remove through the public manager API, with
//! the mount helper scripted.

use anyhow::Result;
use sshfs_volume::invoker::InvokerCall;
use sshfs_volume::{ErrorKind, VolumeError};
use sshfs_volume_e2e::{
    assert_count, assert_dir_exists, assert_not_exists, assert_unknown, opts, unique_name,
    TestHarness,
};
use test_case::test_case;

/// Two consumers share one physical mount; only the last release unmounts
#[tokio::test]
async fn test_two_consumers_one_mount() -> Result<()> {
    let harness = TestHarness::new()?;
    let m = harness.manager();
    harness.create("v", "u@h:/p")?;

    let first = m.mount("v", "c1").await?;
    let second = m.mount("v", "c2").await?;
    assert_eq!(first, second);
    assert_dir_exists(&first);
    assert_count(m, "v", 2)?;

    m.unmount("v", "c1").await?;
    assert_count(m, "v", 1)?;
    assert!(matches!(
        m.remove("v").await,
        Err(VolumeError::InUse { connections: 1, .. })
    ));

    m.unmount("v", "c2").await?;
    assert_count(m, "v", 0)?;
    m.remove("v").await?;

    assert_unknown(m.get("v"));
    assert_not_exists(&first);
    assert_eq!(
        harness.invoker().calls(),
        vec![
            InvokerCall::Establish {
                mountpoint: first.clone(),
                connection: "u@h:/p".to_string(),
            },
            InvokerCall::Teardown { mountpoint: first },
        ]
    );
    Ok(())
}

/// Create does not touch the mount helper or the mountpoint
#[tokio::test]
async fn test_create_is_declaration_only() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create("v", "u@h:/p")?;

    let path = harness.manager().path("v")?;
    assert_not_exists(&path);
    assert!(harness.invoker().calls().is_empty());
    assert_count(harness.manager(), "v", 0)?;
    Ok(())
}

#[test_case(&[] ; "no options")]
#[test_case(&[("password", "secret")] ; "password only")]
#[test_case(&[("sshcmd", "")] ; "empty sshcmd")]
#[tokio::test]
async fn test_create_requires_sshcmd(pairs: &[(&str, &str)]) -> Result<()> {
    let harness = TestHarness::new()?;
    let err = harness.manager().create("v", &opts(pairs)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Request);
    assert!(err.to_string().contains("sshcmd"), "{}", err);
    assert!(harness.manager().list().is_empty());
    Ok(())
}

#[test_case(&[("sshcmd", "u@h:/p"), ("port", "ssh")] ; "port not a number")]
#[test_case(&[("sshcmd", "u@h:/p"), ("port", "70000")] ; "port out of range")]
#[test_case(&[("sshcmd", "u@h:/p"), ("password", "x"), ("identity_file", "/k")] ; "two credentials")]
#[tokio::test]
async fn test_create_rejects_bad_options(pairs: &[(&str, &str)]) -> Result<()> {
    let harness = TestHarness::new()?;
    let err = harness.manager().create("v", &opts(pairs)).unwrap_err();
    assert!(matches!(err, VolumeError::InvalidOption(_)), "{}", err);
    Ok(())
}

#[tokio::test]
async fn test_create_twice_is_rejected() -> Result<()> {
    let harness = TestHarness::new()?;
    let name = unique_name("dup");
    harness.create(&name, "u@h:/p")?;
    let err = harness.manager().create(&name, &opts(&[("sshcmd", "u@h:/q")])).unwrap_err();
    assert!(matches!(err, VolumeError::AlreadyExists(_)));
    assert_eq!(harness.manager().list().len(), 1);
    Ok(())
}

/// Every operation on an unknown name fails the same way and changes nothing
#[tokio::test]
async fn test_unknown_volume_everywhere() -> Result<()> {
    let harness = TestHarness::new()?;
    let m = harness.manager();
    assert_unknown(m.mount("ghost", "c1").await);
    assert_unknown(m.unmount("ghost", "c1").await);
    assert_unknown(m.remove("ghost").await);
    assert_unknown(m.path("ghost"));
    assert_unknown(m.get("ghost"));
    assert!(m.list().is_empty());
    assert_not_exists(&harness.state_path());
    Ok(())
}

#[tokio::test]
async fn test_establish_failure_is_retryable() -> Result<()> {
    let harness = TestHarness::new()?;
    let m = harness.manager();
    harness.create("v", "u@h:/p")?;

    harness.invoker().fail_next_establish("Connection reset by peer");
    let err = m.mount("v", "c1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);
    assert!(err.to_string().contains("Connection reset by peer"));
    assert_count(m, "v", 0)?;

    m.mount("v", "c1").await?;
    assert_count(m, "v", 1)?;
    assert_eq!(harness.invoker().establish_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_teardown_failure_keeps_release() -> Result<()> {
    let harness = TestHarness::new()?;
    let m = harness.manager();
    harness.create("v", "u@h:/p")?;
    m.mount("v", "c1").await?;

    harness.invoker().fail_next_teardown("target is busy");
    let err = m.unmount("v", "c1").await.unwrap_err();
    assert!(matches!(err, VolumeError::Teardown { .. }));
    assert_count(m, "v", 0)?;

    // Nothing left to release
    assert!(matches!(
        m.unmount("v", "c1").await,
        Err(VolumeError::NotMounted(_))
    ));
    m.remove("v").await?;
    Ok(())
}

/// Volumes on the same endpoint share a directory but keep their own counts
#[tokio::test]
async fn test_shared_endpoint() -> Result<()> {
    let harness = TestHarness::new()?;
    let m = harness.manager();
    harness.create("a", "u@h:/p")?;
    m.create("b", &opts(&[("sshcmd", "u@h:/p"), ("reconnect", "")]))?;
    harness.create("c", "u@h:/other")?;
    assert_eq!(m.path("a")?, m.path("b")?);
    assert_ne!(m.path("a")?, m.path("c")?);

    m.mount("a", "c1").await?;
    m.mount("b", "c2").await?;
    m.mount("c", "c3").await?;
    assert_eq!(harness.invoker().establish_count(), 2);
    assert_count(m, "a", 1)?;
    assert_count(m, "b", 1)?;

    m.unmount("b", "c2").await?;
    assert_eq!(harness.invoker().teardown_count(), 0);
    m.remove("b").await?;
    assert_dir_exists(&m.path("a")?);

    m.unmount("a", "c1").await?;
    assert_eq!(harness.invoker().teardown_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_port_changes_mountpoint() -> Result<()> {
    let harness = TestHarness::new()?;
    let m = harness.manager();
    harness.create("default", "u@h:/p")?;
    m.create("custom", &opts(&[("sshcmd", "u@h:/p"), ("port", "2222")]))?;
    assert_ne!(m.path("default")?, m.path("custom")?);
    assert!(m.path("custom")?.starts_with(m.volumes_dir()));
    Ok(())
}
