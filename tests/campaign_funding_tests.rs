mod helpers;

use helpers::*;
use taskora_server::database::mem_store::MemStore;
use taskora_server::database::store::{paths, DocumentStore};
use taskora_server::entities::campaign::campaign_entity::{CampaignInput, CampaignStatus};
use taskora_server::entities::campaign::work_entity::WorkStatus;
use taskora_server::entities::user_auth::local_user_entity::UserRole;
use taskora_server::entities::wallet::wallet_entity::Wallet;
use taskora_server::middleware::error::AppError;
use taskora_server::services::campaign_service::CampaignService;

#[tokio::test]
async fn deduct_moves_budget_from_wallet_into_campaign() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 1000.0,
            ..Wallet::zero()
        },
    )
    .await;
    seed_campaign(&store, &make_campaign("c1", "u1", 500.0)).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let applied = service
        .deduct_campaign_budget("c1", 500.0, "u1", Some("u1"))
        .await
        .unwrap();

    assert!(applied);
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 500.0);
    assert_eq!(read_campaign(&store, "c1").await.remaining_budget, 0.0);
}

#[tokio::test]
async fn deduct_aborts_on_insufficient_campaign_budget() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 1000.0,
            ..Wallet::zero()
        },
    )
    .await;
    let mut campaign = make_campaign("c1", "u1", 500.0);
    campaign.remaining_budget = 100.0;
    seed_campaign(&store, &campaign).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let applied = service
        .deduct_campaign_budget("c1", 500.0, "u1", Some("u1"))
        .await
        .unwrap();

    assert!(!applied);
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 1000.0);
    assert_eq!(read_campaign(&store, "c1").await.remaining_budget, 100.0);
}

#[tokio::test]
async fn insufficient_wallet_restores_campaign_budget() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 100.0,
            ..Wallet::zero()
        },
    )
    .await;
    seed_campaign(&store, &make_campaign("c1", "u1", 500.0)).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let applied = service
        .deduct_campaign_budget("c1", 500.0, "u1", Some("u1"))
        .await
        .unwrap();

    assert!(!applied);
    // phase 1 committed, then compensated
    assert_eq!(read_campaign(&store, "c1").await.remaining_budget, 500.0);
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 100.0);
}

#[tokio::test]
async fn wallet_step_failure_restores_campaign_budget() {
    let store = FlakyStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 1000.0,
            ..Wallet::zero()
        },
    )
    .await;
    seed_campaign(&store, &make_campaign("c1", "u1", 500.0)).await;
    store.fail_transact_on("wallets/u1");

    let service = CampaignService::new(&store, &cache, &ctx);
    let err = service
        .deduct_campaign_budget("c1", 500.0, "u1", Some("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err.error, AppError::Store { .. }));
    assert_eq!(read_campaign(&store, "c1").await.remaining_budget, 500.0);
}

#[tokio::test]
async fn missing_campaign_is_not_found() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(&store, "u1", Wallet::zero()).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let err = service
        .deduct_campaign_budget("ghost", 10.0, "u1", Some("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err.error, AppError::EntityFailIdNotFound { .. }));
}

#[tokio::test]
async fn create_campaign_funds_the_full_budget() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_user(&store, "u1", UserRole::User).await;
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 1000.0,
            ..Wallet::zero()
        },
    )
    .await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let input = CampaignInput {
        title: "Share our launch post".to_string(),
        description: "Share the launch post and keep it up for a day".to_string(),
        total_workers: 10,
        reward_per_worker: 50.0,
        priority: 1,
        category: "social".to_string(),
    };
    let campaign = service
        .create_campaign("u1", input, Some("u1"))
        .await
        .unwrap()
        .expect("funded campaign");

    assert_eq!(campaign.total_budget, 500.0);
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 500.0);
    let stored = read_campaign(&store, &campaign.id).await;
    assert_eq!(stored.remaining_budget, 0.0);
    assert_eq!(stored.status, CampaignStatus::Active);
}

#[tokio::test]
async fn create_campaign_with_insufficient_funds_leaves_no_document() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_user(&store, "u1", UserRole::User).await;
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 100.0,
            ..Wallet::zero()
        },
    )
    .await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let input = CampaignInput {
        title: "Too expensive".to_string(),
        description: "The creator cannot cover this budget".to_string(),
        total_workers: 10,
        reward_per_worker: 50.0,
        priority: 1,
        category: "social".to_string(),
    };
    let created = service.create_campaign("u1", input, Some("u1")).await.unwrap();

    assert!(created.is_none());
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 100.0);
    let campaigns = store.get("campaigns").await.unwrap();
    let left_behind = campaigns
        .as_ref()
        .and_then(|v| v.as_object())
        .map(|m| m.len())
        .unwrap_or(0);
    assert_eq!(left_behind, 0);
}

#[tokio::test]
async fn create_campaign_rejects_invalid_input() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");

    let service = CampaignService::new(&store, &cache, &ctx);
    let input = CampaignInput {
        title: "".to_string(),
        description: "Valid description".to_string(),
        total_workers: 10,
        reward_per_worker: 50.0,
        priority: 1,
        category: "social".to_string(),
    };
    let err = service
        .create_campaign("u1", input, Some("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err.error, AppError::Validation { .. }));
}

#[tokio::test]
async fn apply_creates_work_item_and_takes_a_slot() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u2");
    let mut campaign = make_campaign("c1", "u1", 500.0);
    campaign.total_workers = 2;
    seed_campaign(&store, &campaign).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let applied = service
        .apply_to_campaign("c1", "u2", "Worker Two", 25.0, Some("u2"))
        .await
        .unwrap();

    assert!(applied);
    let work = read_work(&store, "u2", "c1").await;
    assert_eq!(work.status, WorkStatus::Pending);
    assert_eq!(work.reward, 25.0);
    assert_eq!(work.campaign_id, "c1");
    assert_eq!(read_campaign(&store, "c1").await.completed_workers, 1);
}

#[tokio::test]
async fn duplicate_application_is_counted_once() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u2");
    seed_campaign(&store, &make_campaign("c1", "u1", 500.0)).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    assert!(service
        .apply_to_campaign("c1", "u2", "Worker Two", 25.0, Some("u2"))
        .await
        .unwrap());
    let applied_again = service
        .apply_to_campaign("c1", "u2", "Worker Two", 25.0, Some("u2"))
        .await
        .unwrap();

    assert!(!applied_again);
    assert_eq!(read_campaign(&store, "c1").await.completed_workers, 1);
}

#[tokio::test]
async fn full_campaign_rejects_new_applications() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u2");
    let mut campaign = make_campaign("c1", "u1", 500.0);
    campaign.total_workers = 1;
    campaign.completed_workers = 1;
    seed_campaign(&store, &campaign).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let applied = service
        .apply_to_campaign("c1", "u2", "Worker Two", 25.0, Some("u2"))
        .await
        .unwrap();

    assert!(!applied);
    assert!(store.get(&paths::work("u2", "c1")).await.unwrap().is_none());
}

#[tokio::test]
async fn inactive_campaign_rejects_applications() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u2");
    let mut campaign = make_campaign("c1", "u1", 500.0);
    campaign.status = CampaignStatus::Paused;
    seed_campaign(&store, &campaign).await;

    let service = CampaignService::new(&store, &cache, &ctx);
    let applied = service
        .apply_to_campaign("c1", "u2", "Worker Two", 25.0, Some("u2"))
        .await
        .unwrap();
    assert!(!applied);
}
