//! 养成集成测试

mod common;

use std::sync::Arc;

use uuid::Uuid;

use gacha_service::models::BatchSize;
use gacha_service::repository::InventoryRepositoryTrait;
use gacha_service::service::{EnhanceRequest, EnhancementService, SuccessCurve};
use gacha_service::{GachaError, ScriptedDrawFactory};
use gacha_shared::retry::RetryPolicy;

use common::{Harness, ORE, USER, enhancement_policy, materials, pull_request};

fn always_succeeds() -> SuccessCurve {
    SuccessCurve::Linear {
        base: 1.0,
        decay_per_level: 0.0,
        floor: 1.0,
    }
}

fn always_fails() -> SuccessCurve {
    SuccessCurve::Table(vec![0.0])
}

fn draws() -> Arc<ScriptedDrawFactory> {
    Arc::new(ScriptedDrawFactory::new(vec![0.99]))
}

async fn harness_with_item() -> (Harness, Uuid) {
    let harness = Harness::new(draws(), RetryPolicy::immediate(5)).await;
    let outcome = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Single, "seed-pull"))
        .await
        .unwrap();
    let item_id = outcome.record.results[0].inventory_item_id;
    (harness, item_id)
}

fn enhance_request(item_id: Uuid, qty: i64, key: Option<&str>) -> EnhanceRequest {
    EnhanceRequest {
        user_id: USER.to_string(),
        inventory_item_id: item_id,
        materials: materials(qty),
        idempotency_key: key.map(str::to_string),
    }
}

#[tokio::test]
async fn test_successful_enhancement_levels_up_and_charges_wallet() {
    let (harness, item_id) = harness_with_item().await;
    let service = harness.enhancement(draws(), enhancement_policy(always_succeeds()));
    service.grant_materials(USER, materials(100)).await.unwrap();

    let outcome = service
        .enhance(enhance_request(item_id, 10, None))
        .await
        .unwrap();

    assert!(outcome.attempt.success);
    assert_eq!(outcome.attempt.level_before, 0);
    assert_eq!(outcome.attempt.level_after, 1);
    assert_eq!(outcome.attempt.materials_consumed[ORE], 10);

    let item = harness.store.get_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.level, 1);
    assert_eq!(item.version, 2);
    let wallet = harness.store.load_wallet(USER).await.unwrap();
    assert_eq!(wallet.balance(ORE), 90);
}

#[tokio::test]
async fn test_failed_enhancement_consumes_half_rounded_up() {
    let (harness, item_id) = harness_with_item().await;
    let service = harness.enhancement(draws(), enhancement_policy(always_fails()));
    service.grant_materials(USER, materials(100)).await.unwrap();

    let outcome = service
        .enhance(enhance_request(item_id, 11, None))
        .await
        .unwrap();

    assert!(!outcome.attempt.success);
    assert_eq!(outcome.attempt.level_after, 0);
    assert_eq!(outcome.attempt.materials_consumed[ORE], 6);

    let item = harness.store.get_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.level, 0);
    let wallet = harness.store.load_wallet(USER).await.unwrap();
    assert_eq!(wallet.balance(ORE), 94);
}

#[tokio::test]
async fn test_insufficient_materials_changes_nothing() {
    let (harness, item_id) = harness_with_item().await;
    let service = harness.enhancement(draws(), enhancement_policy(always_succeeds()));
    service.grant_materials(USER, materials(5)).await.unwrap();

    let err = service
        .enhance(enhance_request(item_id, 10, None))
        .await
        .unwrap_err();

    match err {
        GachaError::InsufficientMaterials {
            material_id,
            required,
            available,
        } => {
            assert_eq!(material_id, ORE);
            assert_eq!(required, 10);
            assert_eq!(available, 5);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let item = harness.store.get_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.level, 0);
    assert_eq!(item.version, 1);
    let wallet = harness.store.load_wallet(USER).await.unwrap();
    assert_eq!(wallet.balance(ORE), 5);
    assert!(harness.store.list_attempts(USER, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_offer_below_level_cost_is_rejected() {
    let (harness, item_id) = harness_with_item().await;
    let service = harness.enhancement(draws(), enhancement_policy(always_succeeds()));
    service.grant_materials(USER, materials(100)).await.unwrap();

    let err = service
        .enhance(enhance_request(item_id, 9, None))
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::Validation(_)));
}

#[tokio::test]
async fn test_max_level_is_enforced() {
    let (harness, item_id) = harness_with_item().await;
    let service = harness.enhancement(draws(), enhancement_policy(always_succeeds()));
    service.grant_materials(USER, materials(100)).await.unwrap();

    // 0 -> 1 -> 2 -> 3 分别消耗 10、15、20
    for cost in [10, 15, 20] {
        service
            .enhance(enhance_request(item_id, cost, None))
            .await
            .unwrap();
    }

    let err = service
        .enhance(enhance_request(item_id, 25, None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GachaError::MaxLevelReached {
            level: 3,
            max_level: 3
        }
    ));
    let wallet = harness.store.load_wallet(USER).await.unwrap();
    assert_eq!(wallet.balance(ORE), 55);
}

#[tokio::test]
async fn test_other_users_item_is_not_owned() {
    let (harness, item_id) = harness_with_item().await;
    let service = harness.enhancement(draws(), enhancement_policy(always_succeeds()));
    service.grant_materials("user-2", materials(100)).await.unwrap();

    let mut request = enhance_request(item_id, 10, None);
    request.user_id = "user-2".to_string();
    let err = service.enhance(request).await.unwrap_err();
    assert!(matches!(err, GachaError::NotOwned(id) if id == item_id));

    let err = service
        .enhance(enhance_request(Uuid::now_v7(), 10, None))
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::NotOwned(_)));
}

#[tokio::test]
async fn test_enhancement_idempotency_key_replays() {
    let (harness, item_id) = harness_with_item().await;
    let service = harness.enhancement(draws(), enhancement_policy(always_succeeds()));
    service.grant_materials(USER, materials(100)).await.unwrap();

    let first = service
        .enhance(enhance_request(item_id, 10, Some("enh-1")))
        .await
        .unwrap();
    let second = service
        .enhance(enhance_request(item_id, 10, Some("enh-1")))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.attempt.id, second.attempt.id);
    assert_eq!(second.item.map(|i| i.level), Some(1));
    let wallet = harness.store.load_wallet(USER).await.unwrap();
    assert_eq!(wallet.balance(ORE), 90);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enhancements_share_wallet_consistently() {
    let harness = Harness::new(draws(), RetryPolicy::immediate(5)).await;
    let outcome = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "seed-ten"))
        .await
        .unwrap();

    let service = Arc::new(EnhancementService::new(
        harness.store.clone(),
        enhancement_policy(always_succeeds()),
        draws(),
        RetryPolicy::immediate(64),
    ));
    service.grant_materials(USER, materials(200)).await.unwrap();

    let mut handles = Vec::new();
    for result in outcome.record.results.iter().take(4) {
        let service = service.clone();
        let item_id = result.inventory_item_id;
        handles.push(tokio::spawn(async move {
            service
                .enhance(enhance_request(item_id, 10, None))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().attempt.success);
    }

    let wallet = harness.store.load_wallet(USER).await.unwrap();
    assert_eq!(wallet.balance(ORE), 160);
    assert_eq!(harness.store.list_attempts(USER, 10).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_grant_overflow_is_rejected_and_wallet_kept() {
    let harness = Harness::new(draws(), RetryPolicy::immediate(5)).await;
    let service = harness.enhancement(draws(), enhancement_policy(always_succeeds()));

    service
        .grant_materials(USER, materials(i64::MAX))
        .await
        .unwrap();
    let err = service
        .grant_materials(USER, materials(1))
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::Validation(_)));

    let wallet = harness.store.load_wallet(USER).await.unwrap();
    assert_eq!(wallet.balance(ORE), i64::MAX);
    assert_eq!(wallet.version, 1);
}
