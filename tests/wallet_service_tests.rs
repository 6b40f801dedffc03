mod helpers;

use helpers::*;
use taskora_server::database::mem_store::MemStore;
use taskora_server::entities::user_auth::local_user_entity::{LocalUser, LocalUserDbService, UserRole};
use taskora_server::entities::wallet::balance_transaction_entity::{
    BalanceTransactionDbService, TransactionRecord, TransactionStatus, TransactionType,
};
use taskora_server::entities::wallet::wallet_entity::{Wallet, WalletDelta, WalletPatch};
use taskora_server::middleware::error::AppError;
use taskora_server::services::wallet_service::WalletService;

#[tokio::test]
async fn update_wallet_balance_merges_patch() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            earned_balance: 100.0,
            added_balance: 50.0,
            ..Wallet::zero()
        },
    )
    .await;

    let service = WalletService::new(&store, &cache, &ctx);
    let applied = service
        .update_wallet_balance(
            "u1",
            |wallet| {
                Some(WalletPatch {
                    added_balance: Some(wallet.added_balance + 25.0),
                    ..WalletPatch::default()
                })
            },
            Some("u1"),
        )
        .await
        .unwrap();

    assert!(applied);
    let wallet = read_wallet(&store, "u1").await;
    assert_eq!(wallet.added_balance, 75.0);
    assert_eq!(wallet.earned_balance, 100.0);
}

#[tokio::test]
async fn update_wallet_balance_abort_sentinel_leaves_wallet_untouched() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 50.0,
            ..Wallet::zero()
        },
    )
    .await;

    let service = WalletService::new(&store, &cache, &ctx);
    let applied = service
        .update_wallet_balance("u1", |_| None, Some("u1"))
        .await
        .unwrap();

    assert!(!applied);
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 50.0);
}

#[tokio::test]
async fn update_wallet_balance_rejects_out_of_bounds_post_state() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(&store, "u1", Wallet::zero()).await;

    let service = WalletService::new(&store, &cache, &ctx);
    let applied = service
        .update_wallet_balance(
            "u1",
            |_| {
                Some(WalletPatch {
                    earned_balance: Some(20_000_000.0),
                    ..WalletPatch::default()
                })
            },
            Some("u1"),
        )
        .await
        .unwrap();

    assert!(!applied);
    assert_eq!(read_wallet(&store, "u1").await.earned_balance, 0.0);
}

#[tokio::test]
async fn update_wallet_balance_requires_self_or_admin() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u2");
    seed_user(&store, "u2", UserRole::User).await;
    seed_wallet(&store, "u1", Wallet::zero()).await;

    let service = WalletService::new(&store, &cache, &ctx);
    let err = service
        .update_wallet_balance(
            "u1",
            |_| Some(WalletPatch::default()),
            Some("u2"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.error, AppError::AuthorizationFail { .. }));

    // an unblocked admin may act on another user's wallet
    seed_user(&store, "admin", UserRole::Admin).await;
    let applied = service
        .update_wallet_balance(
            "u1",
            |_| {
                Some(WalletPatch {
                    added_balance: Some(10.0),
                    ..WalletPatch::default()
                })
            },
            Some("admin"),
        )
        .await
        .unwrap();
    assert!(applied);
}

#[tokio::test]
async fn blocked_admin_is_not_authorized() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("admin");
    seed_blocked_admin(&store, "admin").await;
    seed_wallet(&store, "u1", Wallet::zero()).await;

    let service = WalletService::new(&store, &cache, &ctx);
    let err = service
        .update_wallet_balance("u1", |_| Some(WalletPatch::default()), Some("admin"))
        .await
        .unwrap_err();
    assert!(matches!(err.error, AppError::AuthorizationFail { .. }));
}

#[tokio::test]
async fn create_transaction_adjusts_wallet_and_appends_audit() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(&store, "u1", Wallet::zero()).await;

    let service = WalletService::new(&store, &cache, &ctx);
    let record = TransactionRecord::new(
        TransactionType::AddMoney,
        100.0,
        TransactionStatus::Approved,
    );
    let delta = WalletDelta {
        added_balance: 100.0,
        ..WalletDelta::default()
    };
    let applied = service
        .create_transaction_and_adjust_wallet("u1", &record, &delta, Some("u1"))
        .await
        .unwrap();

    assert!(applied);
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 100.0);

    let audit = BalanceTransactionDbService {
        store: &store,
        ctx: &ctx,
    };
    let records = audit.user_transaction_list("u1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].r#type, TransactionType::AddMoney);
    assert_eq!(records[0].status, TransactionStatus::Approved);
}

#[tokio::test]
async fn negative_delta_is_floored_at_zero() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            added_balance: 50.0,
            ..Wallet::zero()
        },
    )
    .await;

    let service = WalletService::new(&store, &cache, &ctx);
    let record =
        TransactionRecord::new(TransactionType::CampaignSpend, 80.0, TransactionStatus::Paid);
    let delta = WalletDelta {
        added_balance: -80.0,
        ..WalletDelta::default()
    };
    let applied = service
        .create_transaction_and_adjust_wallet("u1", &record, &delta, Some("u1"))
        .await
        .unwrap();

    assert!(applied);
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 0.0);
}

#[tokio::test]
async fn invalid_audit_record_fails_before_any_write() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(&store, "u1", Wallet::zero()).await;

    let service = WalletService::new(&store, &cache, &ctx);
    let record = TransactionRecord::new(TransactionType::Earning, 0.0, TransactionStatus::Pending);
    let err = service
        .create_transaction_and_adjust_wallet("u1", &record, &WalletDelta::default(), Some("u1"))
        .await
        .unwrap_err();

    assert!(matches!(err.error, AppError::Validation { .. }));
    let audit = BalanceTransactionDbService {
        store: &store,
        ctx: &ctx,
    };
    assert!(audit.user_transaction_list("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn wallet_step_failure_marks_audit_record_failed() {
    let store = FlakyStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(&store, "u1", Wallet::zero()).await;
    store.fail_transact_on("wallets/u1");

    let service = WalletService::new(&store, &cache, &ctx);
    let record =
        TransactionRecord::new(TransactionType::AddMoney, 25.0, TransactionStatus::Approved);
    let delta = WalletDelta {
        added_balance: 25.0,
        ..WalletDelta::default()
    };
    let err = service
        .create_transaction_and_adjust_wallet("u1", &record, &delta, Some("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err.error, AppError::Store { .. }));

    // wallet untouched, audit entry kept and marked failed
    assert_eq!(read_wallet(&store, "u1").await.added_balance, 0.0);
    let audit = BalanceTransactionDbService {
        store: &store,
        ctx: &ctx,
    };
    let records = audit.user_transaction_list("u1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn over_max_adjustment_aborts_and_marks_audit_failed() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");
    seed_wallet(
        &store,
        "u1",
        Wallet {
            earned_balance: 9_999_990.0,
            ..Wallet::zero()
        },
    )
    .await;

    let service = WalletService::new(&store, &cache, &ctx);
    let record = TransactionRecord::new(TransactionType::Earning, 100.0, TransactionStatus::Paid);
    let delta = WalletDelta {
        earned_balance: 100.0,
        ..WalletDelta::default()
    };
    let applied = service
        .create_transaction_and_adjust_wallet("u1", &record, &delta, Some("u1"))
        .await
        .unwrap();

    assert!(!applied);
    assert_eq!(read_wallet(&store, "u1").await.earned_balance, 9_999_990.0);
    let audit = BalanceTransactionDbService {
        store: &store,
        ctx: &ctx,
    };
    let records = audit.user_transaction_list("u1").await.unwrap();
    assert_eq!(records[0].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn sign_up_seeds_profile_and_zero_wallet() {
    let store = MemStore::new();
    let cache = test_cache();
    let ctx = test_ctx("u1");

    let users = LocalUserDbService {
        store: &store,
        cache: &cache,
        ctx: &ctx,
    };
    let user = LocalUser::new(
        "u1".to_string(),
        "worker@example.com".to_string(),
        "Worker One".to_string(),
    );
    users.create_with_wallet(&user).await.unwrap();

    assert_eq!(read_user(&store, "u1").await.email, "worker@example.com");
    assert_eq!(read_wallet(&store, "u1").await, Wallet::zero());

    // a user with no wallet document still reads as all-zero
    let service = WalletService::new(&store, &cache, &ctx);
    assert_eq!(service.get_balance("ghost").await.unwrap(), Wallet::zero());
}
