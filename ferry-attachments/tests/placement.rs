//! Placement strategies driven the way a consumption cycle drives them

use std::sync::Arc;

use ferry_attachments::{
    AcquireRequest, FileStrategy, PlacementError, PlacementStrategy, StagedBuffer,
    StrategyConfig, TestStrategy,
};
use ferry_common::{Attachment, ExchangeMessage};
use tokio::io::AsyncWriteExt;

const PAYLOADS: [(&str, &[u8]); 3] = [
    ("first.txt", b"one"),
    ("second.txt", b"two two"),
    ("third.txt", b"three three three"),
];

/// Stage every payload, registering each buffer before it is filled.
async fn stage_all(
    strategy: &dyn PlacementStrategy,
    exchange: &mut ExchangeMessage,
    staged: &mut Vec<StagedBuffer>,
) -> Result<(), PlacementError> {
    for (ordinal, (name, bytes)) in PAYLOADS.iter().enumerate() {
        let request = AcquireRequest {
            message_id: "0190a3f2-7c1e",
            attachment_id: name,
            attachment_name: name,
            mime_type: "text/plain",
            signature: &[],
            ordinal,
            total: PAYLOADS.len(),
        };

        let Some(buffer) = strategy.acquire(exchange, &request).await? else {
            continue;
        };
        staged.push(buffer);
        let buffer = staged.last_mut().ok_or(PlacementError::Internal("empty".into()))?;

        let mut writer = buffer.writer().await?;
        writer.write_all(bytes).await?;
        writer.shutdown().await?;
        drop(writer);

        let mut attachment = Attachment::new(*name, buffer.seal().await?);
        if strategy.finalize(exchange, &mut attachment, buffer).await? {
            exchange.attachments.push(attachment);
        }
    }
    Ok(())
}

async fn teardown(strategy: &dyn PlacementStrategy, staged: &mut Vec<StagedBuffer>) {
    for buffer in staged.iter_mut() {
        strategy.release(buffer).await;
    }
    staged.clear();
}

#[tokio::test]
async fn test_release_balances_acquire_without_failures() {
    let strategy = TestStrategy::new();
    let mut exchange = ExchangeMessage::default();
    let mut staged = Vec::new();

    stage_all(&strategy, &mut exchange, &mut staged).await.unwrap();
    assert_eq!(exchange.attachments.len(), 3);
    assert_eq!(
        exchange.attachments[2].content.read_all().await.unwrap(),
        b"three three three"
    );

    teardown(&strategy, &mut staged).await;
    assert_eq!(strategy.acquired(), 3);
    assert_eq!(strategy.released(), 3);
}

#[tokio::test]
async fn test_release_balances_acquire_on_failure() {
    for fail_at in 0..PAYLOADS.len() {
        for fail_finalize in [false, true] {
            let strategy = TestStrategy::new();
            if fail_finalize {
                strategy.fail_finalize_at(fail_at);
            } else {
                strategy.fail_acquire_at(fail_at);
            }

            let mut exchange = ExchangeMessage::default();
            let mut staged = Vec::new();
            assert!(stage_all(&strategy, &mut exchange, &mut staged).await.is_err());

            teardown(&strategy, &mut staged).await;
            assert_eq!(strategy.outstanding(), 0, "leak at {fail_at} ({fail_finalize})");
            assert_eq!(strategy.acquired(), strategy.released());
        }
    }
}

#[tokio::test]
async fn test_skipped_and_hidden_attachments() {
    let strategy = TestStrategy::new();
    strategy.skip_at(0);
    strategy.hide_at(2);

    let mut exchange = ExchangeMessage::default();
    let mut staged = Vec::new();
    stage_all(&strategy, &mut exchange, &mut staged).await.unwrap();

    let ids: Vec<_> = exchange.attachments.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["second.txt"]);

    teardown(&strategy, &mut staged).await;
    assert_eq!(strategy.acquired(), 2);
    assert_eq!(strategy.released(), 2);
}

#[tokio::test]
async fn test_file_strategy_leaves_nothing_behind() {
    let root = tempfile::tempdir().unwrap();
    let strategy = TestStrategy::wrap(Arc::new(FileStrategy::new(root.path()).unwrap()));
    strategy.fail_finalize_at(1);

    let mut exchange = ExchangeMessage::default();
    let mut staged = Vec::new();
    assert!(stage_all(&strategy, &mut exchange, &mut staged).await.is_err());
    assert!(root.path().join("0190a3f2-7c1e").join("second.txt").exists());

    teardown(&strategy, &mut staged).await;
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_configured_strategy() {
    let root = tempfile::tempdir().unwrap();
    let config: StrategyConfig = ron::from_str(&format!(
        r#"(type: "File", path: "{}")"#,
        root.path().display()
    ))
    .unwrap();

    let strategy = config.into_strategy();
    let mut exchange = ExchangeMessage::default();
    let mut staged = Vec::new();
    stage_all(strategy.as_ref(), &mut exchange, &mut staged)
        .await
        .unwrap();

    let content_ref = exchange.attachments[0].headers.content_ref.clone().unwrap();
    assert!(content_ref.starts_with(root.path()));

    teardown(strategy.as_ref(), &mut staged).await;
    assert!(!content_ref.exists());
}
