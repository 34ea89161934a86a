//! Integration tests for the ledger file watcher: external overwrites are
//! picked up within a poll interval, our own writes never trigger a reload.

use std::collections::HashMap;
use std::time::Duration;

use chipbank::{Account, Economy, EconomyConfig, LedgerFile, UserId};
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> EconomyConfig {
    EconomyConfig {
        ledger_path: dir.path().join("economy.json"),
        starting_balance: 100,
        ..EconomyConfig::default()
    }
}

/// Poll until the user's balance matches `expected`, or give up.
async fn wait_for_balance(economy: &Economy, user: UserId, expected: u64) -> bool {
    for _ in 0..100 {
        if economy.get_balance(user).await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_external_overwrite_is_applied_within_a_poll_interval() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let economy = Economy::open(config.clone()).await.unwrap();

    economy.set_balance(1, 500).await;
    assert!(economy.start_file_watching(Duration::from_millis(50)));
    assert!(economy.watcher_status().running);

    // coarse-mtime filesystems need the rewrite to land on a later tick
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // a restore script replaces the ledger out-of-band
    let mut restored = HashMap::new();
    restored.insert(1u64, Account::new(9000));
    restored.insert(2u64, Account::new(40));
    LedgerFile::new(&config.ledger_path)
        .save(&restored)
        .await
        .unwrap();

    assert!(wait_for_balance(&economy, 1, 9000).await);
    assert_eq!(economy.get_balance(2).await, 40);

    // a mutation committed after the reload survives alongside the
    // restored values
    economy.add_balance(1, 11).await.unwrap();
    assert_eq!(economy.get_balance(1).await, 9011);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(economy.get_balance(1).await, 9011);
    assert_eq!(economy.get_balance(2).await, 40);

    economy.shutdown().await.unwrap();
    assert!(!economy.watcher_status().running);
}

#[tokio::test]
async fn test_own_writes_do_not_trigger_reload() {
    let dir = TempDir::new().unwrap();
    let economy = Economy::open(config_in(&dir)).await.unwrap();

    economy.start_file_watching(Duration::from_millis(50));

    // write-through saves on every mutation; none of them may bounce back
    // as a reload that loses later state
    for i in 1..=20u64 {
        economy.set_balance(i, i * 10).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    for i in 1..=20u64 {
        assert_eq!(economy.get_balance(i).await, i * 10);
    }
    assert_eq!(economy.user_count().await, 20);

    economy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_watcher_admin_boundary() {
    let dir = TempDir::new().unwrap();
    let economy = Economy::open(config_in(&dir)).await.unwrap();

    assert!(!economy.stop_file_watching(), "stop while stopped is a no-op");
    assert!(economy.start_file_watching(Duration::from_millis(50)));
    assert!(
        !economy.start_file_watching(Duration::from_millis(50)),
        "start while running is a no-op"
    );

    let status = economy.watcher_status();
    assert!(status.running);
    assert_eq!(status.interval, Some(Duration::from_millis(50)));

    assert!(economy.stop_file_watching());
    assert!(!economy.stop_file_watching());
    assert!(!economy.watcher_status().running);

    economy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_external_write_keeps_serving_old_state() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let economy = Economy::open(config.clone()).await.unwrap();

    economy.set_balance(1, 500).await;
    economy.start_file_watching(Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    tokio::fs::write(&config.ledger_path, b"not json at all")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // the watcher failed to reload and said so in the log; balances are
    // still served from memory
    assert_eq!(economy.get_balance(1).await, 500);
    assert!(economy.watcher_status().running);

    economy.shutdown().await.unwrap();
}
