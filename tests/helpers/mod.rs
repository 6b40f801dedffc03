#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use serde_json::Value;
use uuid::Uuid;

use taskora_server::database::mem_store::MemStore;
use taskora_server::database::read_cache::ReadCache;
use taskora_server::database::store::{paths, DocumentStore, TxFn, TxOutcome};
use taskora_server::entities::campaign::campaign_entity::{Campaign, CampaignStatus};
use taskora_server::entities::campaign::work_entity::{Work, WorkStatus};
use taskora_server::entities::user_auth::local_user_entity::{LocalUser, UserRole};
use taskora_server::entities::wallet::money_request_entity::{
    MoneyRequest, MoneyRequestStatus, MoneyRequestType,
};
use taskora_server::entities::wallet::wallet_entity::Wallet;
use taskora_server::middleware::ctx::Ctx;
use taskora_server::middleware::error::{AppError, AppResult};

pub fn test_ctx(user_id: &str) -> Ctx {
    Ctx::new(Ok(user_id.to_string()), Uuid::new_v4())
}

pub fn test_cache() -> ReadCache {
    ReadCache::new(Duration::from_secs(300), 100)
}

pub async fn seed_user(store: &impl DocumentStore, uid: &str, role: UserRole) -> LocalUser {
    let mut user = LocalUser::new(uid.to_string(), SafeEmail().fake(), Name().fake());
    user.role = role;
    store
        .set(&paths::user(uid), user.to_value())
        .await
        .expect("seed user");
    user
}

pub async fn seed_blocked_admin(store: &impl DocumentStore, uid: &str) -> LocalUser {
    let mut user = LocalUser::new(uid.to_string(), SafeEmail().fake(), Name().fake());
    user.role = UserRole::Admin;
    user.is_blocked = true;
    store
        .set(&paths::user(uid), user.to_value())
        .await
        .expect("seed blocked admin");
    user
}

pub async fn seed_wallet(store: &impl DocumentStore, uid: &str, wallet: Wallet) {
    store
        .set(&paths::wallet(uid), wallet.to_value())
        .await
        .expect("seed wallet");
}

pub async fn read_wallet(store: &impl DocumentStore, uid: &str) -> Wallet {
    let value = store
        .get(&paths::wallet(uid))
        .await
        .expect("read wallet")
        .expect("wallet exists");
    serde_json::from_value(value).expect("wallet decodes")
}

pub async fn read_user(store: &impl DocumentStore, uid: &str) -> LocalUser {
    let value = store
        .get(&paths::user(uid))
        .await
        .expect("read user")
        .expect("user exists");
    serde_json::from_value(value).expect("user decodes")
}

pub fn make_campaign(id: &str, creator_id: &str, total_budget: f64) -> Campaign {
    Campaign {
        id: id.to_string(),
        title: "Follow and share".to_string(),
        description: "Follow the page and share the pinned post".to_string(),
        creator_id: creator_id.to_string(),
        total_workers: 100,
        reward_per_worker: 5.0,
        total_budget,
        remaining_budget: total_budget,
        completed_workers: 0,
        status: CampaignStatus::Active,
        created_at: chrono::Utc::now().timestamp_millis(),
        priority: 1,
        category: "social".to_string(),
    }
}

pub async fn seed_campaign(store: &impl DocumentStore, campaign: &Campaign) {
    store
        .set(&paths::campaign(&campaign.id), campaign.to_value())
        .await
        .expect("seed campaign");
}

pub async fn read_campaign(store: &impl DocumentStore, campaign_id: &str) -> Campaign {
    let value = store
        .get(&paths::campaign(campaign_id))
        .await
        .expect("read campaign")
        .expect("campaign exists");
    serde_json::from_value(value).expect("campaign decodes")
}

pub fn make_work(user_id: &str, campaign_id: &str, reward: f64, status: WorkStatus) -> Work {
    Work {
        id: campaign_id.to_string(),
        user_id: user_id.to_string(),
        user_name: Name().fake(),
        campaign_id: campaign_id.to_string(),
        proof_url: None,
        status,
        submitted_at: chrono::Utc::now().timestamp_millis(),
        reward,
    }
}

pub async fn seed_work(store: &impl DocumentStore, work: &Work) {
    store
        .set(&paths::work(&work.user_id, &work.id), work.to_value())
        .await
        .expect("seed work");
}

pub async fn read_work(store: &impl DocumentStore, uid: &str, work_id: &str) -> Work {
    let value = store
        .get(&paths::work(uid, work_id))
        .await
        .expect("read work")
        .expect("work exists");
    serde_json::from_value(value).expect("work decodes")
}

pub async fn seed_money_request(
    store: &impl DocumentStore,
    request_id: &str,
    user_id: &str,
    r#type: MoneyRequestType,
    amount: f64,
) -> MoneyRequest {
    let request = MoneyRequest {
        user_id: user_id.to_string(),
        r#type,
        amount,
        status: MoneyRequestStatus::Pending,
        created_at: Some(chrono::Utc::now().timestamp_millis()),
    };
    store
        .set(
            &r#type.request_path(request_id),
            serde_json::to_value(&request).expect("request serializes"),
        )
        .await
        .expect("seed request");
    request
}

pub async fn read_money_request(
    store: &impl DocumentStore,
    request_id: &str,
    r#type: MoneyRequestType,
) -> MoneyRequest {
    let value = store
        .get(&r#type.request_path(request_id))
        .await
        .expect("read request")
        .expect("request exists");
    serde_json::from_value(value).expect("request decodes")
}

/// Store wrapper that fails `transact` on configured path prefixes, for
/// exercising the compensation paths.
pub struct FlakyStore {
    inner: MemStore,
    fail_transact_prefixes: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemStore::new(),
            fail_transact_prefixes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_transact_on(&self, prefix: &str) {
        self.fail_transact_prefixes
            .lock()
            .unwrap()
            .insert(prefix.to_string());
    }

    pub fn heal(&self) {
        self.fail_transact_prefixes.lock().unwrap().clear();
    }

    fn should_fail(&self, path: &str) -> bool {
        self.fail_transact_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, path: &str) -> AppResult<Option<Value>> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> AppResult<()> {
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &str, partial: Value) -> AppResult<()> {
        self.inner.update(path, partial).await
    }

    async fn push(&self, path: &str) -> AppResult<String> {
        self.inner.push(path).await
    }

    async fn transact(&self, path: &str, f: TxFn<'_>) -> AppResult<TxOutcome> {
        if self.should_fail(path) {
            return Err(AppError::Store {
                source: format!("injected failure on {path}"),
            });
        }
        self.inner.transact(path, f).await
    }
}
