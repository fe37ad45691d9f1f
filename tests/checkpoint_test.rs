mod common;

use binlog_relay::capture::{Position, RowAction};
use binlog_relay::checkpoint::{Checkpoint, CheckpointManager};
use binlog_relay::config::RelayConfig;
use binlog_relay::EventHandler;
use common::*;
use std::time::Duration;
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(1);

fn checkpointed_config(dir: &TempDir) -> RelayConfig {
    RelayConfig {
        checkpoint_file: Some(dir.path().join("checkpoint.json")),
        ..relay_config()
    }
}

#[tokio::test]
async fn test_checkpoint_persistence() {
    let temp_dir = TempDir::new().unwrap();
    let manager = CheckpointManager::new(temp_dir.path().join("test_checkpoint.json"));

    let checkpoint = Checkpoint::new(Position::new("mysql-bin.000010", 5678), 1000);
    manager.save(&checkpoint).await.unwrap();

    let loaded = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(loaded.position, Position::new("mysql-bin.000010", 5678));
    assert_eq!(loaded.message_count, 1000);

    let checkpoint2 = Checkpoint::new(Position::new("mysql-bin.000011", 4), 2000);
    manager.save(&checkpoint2).await.unwrap();

    let loaded2 = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(loaded2.position, Position::new("mysql-bin.000011", 4));
    assert_eq!(loaded2.message_count, 2000);
}

#[tokio::test]
async fn test_position_saved_after_successful_flush() {
    let temp_dir = TempDir::new().unwrap();
    let broker = MemoryBroker::new();
    let relay = create_relay_with(&broker, checkpointed_config(&temp_dir));
    let manager = relay.checkpoints().unwrap().clone();

    relay.on_row_mutation(&row_event(RowAction::Insert, "row1")).await.unwrap();
    relay.on_row_mutation(&row_event(RowAction::Insert, "row2")).await.unwrap();
    relay
        .on_position_sync(&Position::new("mysql-bin.000001", 500), false)
        .await
        .unwrap();

    // Not acknowledged until the rows before it are delivered
    assert!(manager.load().await.unwrap().is_none());

    assert!(relay.flush(DEADLINE).await.is_ok());

    let checkpoint = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(checkpoint.position, Position::new("mysql-bin.000001", 500));
    assert_eq!(checkpoint.message_count, 2);
}

#[tokio::test]
async fn test_position_not_saved_when_send_fails() {
    let temp_dir = TempDir::new().unwrap();
    let broker = MemoryBroker::new();
    broker.set_failing(true);
    let relay = create_relay_with(&broker, checkpointed_config(&temp_dir));
    let manager = relay.checkpoints().unwrap().clone();

    relay.on_row_mutation(&row_event(RowAction::Insert, "row1")).await.unwrap();
    relay
        .on_position_sync(&Position::new("mysql-bin.000001", 500), false)
        .await
        .unwrap();

    assert!(relay.flush(DEADLINE).await.error.is_some());
    assert!(manager.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_forced_sync_flushes_and_persists_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let broker = MemoryBroker::new();
    let relay = create_relay_with(&broker, checkpointed_config(&temp_dir));
    let manager = relay.checkpoints().unwrap().clone();

    relay.on_row_mutation(&row_event(RowAction::Update, "row1")).await.unwrap();
    relay
        .on_position_sync(&Position::new("mysql-bin.000002", 120), true)
        .await
        .unwrap();

    assert_eq!(broker.delivered_values(), vec!["update [[row1]]"]);
    assert_eq!(relay.pending_len(), 0);

    let checkpoint = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(checkpoint.position, Position::new("mysql-bin.000002", 120));
}

#[tokio::test]
async fn test_forced_sync_failure_keeps_position_with_requeue() {
    let temp_dir = TempDir::new().unwrap();
    let broker = MemoryBroker::new();
    broker.set_failing(true);
    let config = RelayConfig {
        checkpoint_file: Some(temp_dir.path().join("checkpoint.json")),
        ..requeue_config()
    };
    let relay = create_relay_with(&broker, config);
    let manager = relay.checkpoints().unwrap().clone();

    relay.on_row_mutation(&row_event(RowAction::Insert, "row1")).await.unwrap();
    relay
        .on_position_sync(&Position::new("mysql-bin.000004", 300), true)
        .await
        .unwrap();

    // Send failed: nothing acknowledged, batch kept for the next flush
    assert!(manager.load().await.unwrap().is_none());
    assert_eq!(relay.pending_len(), 1);

    broker.set_failing(false);
    assert!(relay.flush(DEADLINE).await.is_ok());
    assert_eq!(broker.delivered_values(), vec!["insert [[row1]]"]);

    let checkpoint = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(checkpoint.position, Position::new("mysql-bin.000004", 300));
}

#[tokio::test]
async fn test_later_position_wins() {
    let temp_dir = TempDir::new().unwrap();
    let broker = MemoryBroker::new();
    let relay = create_relay_with(&broker, checkpointed_config(&temp_dir));
    let manager = relay.checkpoints().unwrap().clone();

    relay
        .on_position_sync(&Position::new("mysql-bin.000003", 100), false)
        .await
        .unwrap();
    relay
        .on_position_sync(&Position::new("mysql-bin.000003", 900), false)
        .await
        .unwrap();

    // No rows pending, so the flush only acknowledges the position
    let result = relay.flush(DEADLINE).await;
    assert!(result.sent.is_empty());
    assert_eq!(broker.send_calls(), 0);

    let checkpoint = manager.load().await.unwrap().expect("Checkpoint should exist");
    assert_eq!(checkpoint.position, Position::new("mysql-bin.000003", 900));
}

#[tokio::test]
async fn test_forced_sync_reports_checkpoint_failure() {
    let temp_dir = TempDir::new().unwrap();
    let broker = MemoryBroker::new();
    let config = RelayConfig {
        checkpoint_file: Some(temp_dir.path().join("missing-dir").join("checkpoint.json")),
        ..relay_config()
    };
    let relay = create_relay_with(&broker, config);

    let result = relay
        .on_position_sync(&Position::new("mysql-bin.000001", 4), true)
        .await;
    assert!(matches!(result, Err(binlog_relay::Error::Io(_))));
}
