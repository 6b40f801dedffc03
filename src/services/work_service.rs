use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::database::read_cache::{keys, ReadCache};
use crate::database::saga::Saga;
use crate::database::store::{paths, DocumentStore, TxDecision};
use crate::entities::campaign::work_entity::{Work, WorkStatus, MAX_REWARD};
use crate::entities::user_auth::local_user_entity::UserRole;
use crate::entities::wallet::balance_transaction_entity::{
    BalanceTransactionDbService, TransactionRecord, TransactionStatus, TransactionType,
};
use crate::entities::wallet::wallet_entity::Wallet;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxError, CtxResult};
use crate::middleware::utils::validation::violations_to_strings;
use crate::services::access_service::AccessService;

static PROOF_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://\S+$").expect("proof url regex compiles"));

/// Work-item ledger operations: proof submission, admin approval with
/// payout, and admin rejection.
pub struct WorkService<'a, S: DocumentStore> {
    store: &'a S,
    cache: &'a ReadCache,
    ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> WorkService<'a, S> {
    pub fn new(store: &'a S, cache: &'a ReadCache, ctx: &'a Ctx) -> Self {
        Self { store, cache, ctx }
    }

    fn access(&self) -> AccessService<'a, S> {
        AccessService {
            store: self.store,
            cache: self.cache,
            ctx: self.ctx,
        }
    }

    fn require_id(&self, field: &str, value: &str) -> CtxResult<()> {
        if value.trim().is_empty() {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: format!("{field} is required"),
            }));
        }
        Ok(())
    }

    /// Proof (re)submission: an existing work item in pending or
    /// rejected state re-enters the review queue with a fresh timestamp.
    pub async fn submit_work(
        &self,
        campaign_id: &str,
        user_id: &str,
        proof_url: &str,
        acting_id: Option<&str>,
    ) -> CtxResult<bool> {
        self.require_id("campaignId", campaign_id)?;
        self.require_id("userId", user_id)?;
        if !PROOF_URL_RE.is_match(proof_url) {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: "proofUrl must be an http(s) URL".to_string(),
            }));
        }
        self.access().require(acting_id, user_id, None).await?;

        let work_path = paths::work(user_id, campaign_id);
        let mut data_err: Option<AppError> = None;
        let outcome = self
            .store
            .transact(
                &work_path,
                Box::new(|current| {
                    data_err = None;
                    let Some(value) = current else {
                        data_err = Some(AppError::EntityFailIdNotFound {
                            ident: work_path.clone(),
                        });
                        return TxDecision::Abort;
                    };
                    let work = match Work::parse(&work_path, value) {
                        Ok(work) => work,
                        Err(err) => {
                            data_err = Some(err);
                            return TxDecision::Abort;
                        }
                    };
                    if let Err(violations) = work.validate() {
                        data_err = Some(AppError::DataIntegrity {
                            ident: work_path.clone(),
                            violations: violations_to_strings(&violations),
                        });
                        return TxDecision::Abort;
                    }
                    if work.status == WorkStatus::Approved {
                        return TxDecision::Abort;
                    }
                    let mut obj = value.as_object().cloned().unwrap_or_default();
                    obj.insert("proofUrl".to_string(), json!(proof_url));
                    obj.insert("status".to_string(), json!(WorkStatus::Pending));
                    obj.insert(
                        "submittedAt".to_string(),
                        json!(Utc::now().timestamp_millis()),
                    );
                    TxDecision::Commit(Value::Object(obj))
                }),
            )
            .await
            .map_err(CtxError::from(self.ctx))?;
        if let Some(err) = data_err {
            return Err(self.ctx.to_ctx_error(err));
        }
        if outcome.committed {
            self.cache.clear(&keys::works(user_id));
        }
        Ok(outcome.committed)
    }

    /// Admin approval with payout: pending work turns approved, the
    /// worker's wallet is credited and the profile counters advance.
    /// A wallet-step failure rolls the work back to pending; a failed
    /// wallet re-validation after commit rolls back both the work status
    /// and the profile counters.
    pub async fn approve_work_and_credit(
        &self,
        work_id: &str,
        user_id: &str,
        campaign_id: &str,
        reward: f64,
        admin_id: Option<&str>,
    ) -> CtxResult<bool> {
        self.require_id("workId", work_id)?;
        self.require_id("userId", user_id)?;
        self.require_id("campaignId", campaign_id)?;
        if !reward.is_finite() || reward <= 0.0 || reward > MAX_REWARD {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: format!("reward must be between 0 and {MAX_REWARD}"),
            }));
        }
        self.access()
            .require(admin_id, user_id, Some(UserRole::Admin))
            .await?;

        // step 1: work pending -> approved
        let work_path = paths::work(user_id, work_id);
        let mut data_err: Option<AppError> = None;
        let outcome = self
            .store
            .transact(
                &work_path,
                Box::new(|current| {
                    data_err = None;
                    let Some(value) = current else {
                        data_err = Some(AppError::EntityFailIdNotFound {
                            ident: work_path.clone(),
                        });
                        return TxDecision::Abort;
                    };
                    let work = match Work::parse(&work_path, value) {
                        Ok(work) => work,
                        Err(err) => {
                            data_err = Some(err);
                            return TxDecision::Abort;
                        }
                    };
                    if let Err(violations) = work.validate() {
                        data_err = Some(AppError::DataIntegrity {
                            ident: work_path.clone(),
                            violations: violations_to_strings(&violations),
                        });
                        return TxDecision::Abort;
                    }
                    if work.status != WorkStatus::Pending {
                        return TxDecision::Abort;
                    }
                    let mut obj = value.as_object().cloned().unwrap_or_default();
                    obj.insert("status".to_string(), json!(WorkStatus::Approved));
                    TxDecision::Commit(Value::Object(obj))
                }),
            )
            .await
            .map_err(CtxError::from(self.ctx))?;
        if let Some(err) = data_err {
            return Err(self.ctx.to_ctx_error(err));
        }
        if !outcome.committed {
            return Ok(false);
        }

        let mut saga = Saga::new("approve_work_and_credit");
        let store = self.store;
        let rollback_work_path = paths::work(user_id, work_id);
        saga.on_rollback("restore work to pending", async move {
            store
                .update(&rollback_work_path, json!({ "status": WorkStatus::Pending }))
                .await
        });

        // step 2: wallet credit
        let wallet_path = paths::wallet(user_id);
        let mut data_err: Option<AppError> = None;
        let wallet_outcome = self
            .store
            .transact(
                &wallet_path,
                Box::new(|current| {
                    data_err = None;
                    let wallet = match current {
                        None => Wallet::zero(),
                        Some(value) => match Wallet::parse(&wallet_path, value) {
                            Ok(wallet) => wallet,
                            Err(err) => {
                                data_err = Some(err);
                                return TxDecision::Abort;
                            }
                        },
                    };
                    let next = Wallet {
                        earned_balance: wallet.earned_balance + reward,
                        ..wallet
                    };
                    if next.validate().is_err() {
                        return TxDecision::Abort;
                    }
                    TxDecision::Commit(next.to_value())
                }),
            )
            .await;

        let committed = match wallet_outcome {
            Err(err) => {
                saga.unwind().await;
                return Err(self.ctx.to_ctx_error(err));
            }
            Ok(outcome) => {
                if let Some(err) = data_err {
                    saga.unwind().await;
                    return Err(self.ctx.to_ctx_error(err));
                }
                outcome.committed
            }
        };
        if !committed {
            saga.unwind().await;
            return Ok(false);
        }

        let comp_wallet_path = paths::wallet(user_id);
        saga.on_rollback("revert wallet credit", async move {
            store
                .transact(
                    &comp_wallet_path,
                    Box::new(|current| {
                        let wallet = current
                            .and_then(|v| Wallet::parse(&comp_wallet_path, v).ok())
                            .unwrap_or_else(Wallet::zero);
                        let next = Wallet {
                            earned_balance: (wallet.earned_balance - reward).max(0.0),
                            ..wallet
                        };
                        TxDecision::Commit(next.to_value())
                    }),
                )
                .await
                .map(|_| ())
        });

        // step 3: profile counters
        let user_path = paths::user(user_id);
        let mut data_err: Option<AppError> = None;
        let user_outcome = self
            .store
            .transact(
                &user_path,
                Box::new(|current| {
                    data_err = None;
                    let Some(value) = current else {
                        data_err = Some(AppError::EntityFailIdNotFound {
                            ident: user_path.clone(),
                        });
                        return TxDecision::Abort;
                    };
                    let Some(obj) = value.as_object() else {
                        data_err = Some(AppError::DataIntegrity {
                            ident: user_path.clone(),
                            violations: vec!["user record is not an object".to_string()],
                        });
                        return TxDecision::Abort;
                    };
                    let mut obj = obj.clone();
                    let earned = obj.get("earnedMoney").and_then(Value::as_f64).unwrap_or(0.0);
                    let approved = obj
                        .get("approvedWorks")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    obj.insert("earnedMoney".to_string(), json!(earned + reward));
                    obj.insert("approvedWorks".to_string(), json!(approved + 1));
                    TxDecision::Commit(Value::Object(obj))
                }),
            )
            .await;
        match user_outcome {
            Err(err) => {
                saga.unwind().await;
                return Err(self.ctx.to_ctx_error(err));
            }
            Ok(_) => {
                if let Some(err) = data_err {
                    saga.unwind().await;
                    return Err(self.ctx.to_ctx_error(err));
                }
            }
        }
        saga.commit();

        // the committed wallet must still read back valid; if not, undo
        // the visible approval (work + counters), the wallet itself is
        // the broken record
        if let Err(err) = self.revalidate_wallet(user_id).await {
            error!("->> approve {work_id} for {user_id}: wallet re-validation failed, rolling back");
            self.rollback_approval(user_id, work_id, reward).await;
            self.invalidate_after_approval(user_id);
            return Err(err);
        }

        let record =
            TransactionRecord::new(TransactionType::Earning, reward, TransactionStatus::Paid);
        let audit = BalanceTransactionDbService {
            store: self.store,
            ctx: self.ctx,
        };
        if let Err(err) = audit.create(user_id, &record).await {
            warn!("->> approve {work_id}: audit record failed: {}", err.error);
        }

        self.invalidate_after_approval(user_id);
        Ok(true)
    }

    async fn revalidate_wallet(&self, user_id: &str) -> CtxResult<()> {
        let wallet_path = paths::wallet(user_id);
        let value = self
            .store
            .get(&wallet_path)
            .await
            .map_err(CtxError::from(self.ctx))?
            .unwrap_or(Value::Null);
        if value.is_null() {
            return Err(self.ctx.to_ctx_error(AppError::EntityFailIdNotFound {
                ident: wallet_path,
            }));
        }
        Wallet::parse(&wallet_path, &value)
            .map(|_| ())
            .map_err(CtxError::from(self.ctx))
    }

    /// Post-commit rollback of an approval: profile counters and work
    /// status, in that order. Best-effort; failures are logged and the
    /// partially-applied state stands.
    async fn rollback_approval(&self, user_id: &str, work_id: &str, reward: f64) {
        let user_path = paths::user(user_id);
        let result = self
            .store
            .transact(
                &user_path,
                Box::new(|current| {
                    let Some(value) = current else {
                        return TxDecision::Abort;
                    };
                    let mut obj = value.as_object().cloned().unwrap_or_default();
                    let earned = obj.get("earnedMoney").and_then(Value::as_f64).unwrap_or(0.0);
                    let approved = obj
                        .get("approvedWorks")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    obj.insert("earnedMoney".to_string(), json!((earned - reward).max(0.0)));
                    obj.insert(
                        "approvedWorks".to_string(),
                        json!(approved.saturating_sub(1)),
                    );
                    TxDecision::Commit(Value::Object(obj))
                }),
            )
            .await;
        if let Err(err) = result {
            error!("->> rollback of {user_id} profile counters failed: {err}");
        }
        let work_path = paths::work(user_id, work_id);
        let result = self
            .store
            .update(&work_path, json!({ "status": WorkStatus::Pending }))
            .await;
        if let Err(err) = result {
            error!("->> rollback of work {work_id} status failed: {err}");
        }
    }

    fn invalidate_after_approval(&self, user_id: &str) {
        self.cache.clear(&keys::wallet(user_id));
        self.cache.clear(&keys::user(user_id));
        self.cache.clear(&keys::works(user_id));
        self.cache.invalidate("leaderboard");
    }

    /// Admin rejection: pending work turns rejected and the campaign
    /// slot is released (`completedWorkers` floored at 0). The campaign
    /// budget is intentionally left untouched; it was spent once, at
    /// funding time.
    pub async fn reject_work_and_release_slot(
        &self,
        work_id: &str,
        user_id: &str,
        campaign_id: &str,
        admin_id: Option<&str>,
    ) -> CtxResult<bool> {
        self.require_id("workId", work_id)?;
        self.require_id("userId", user_id)?;
        self.require_id("campaignId", campaign_id)?;
        self.access()
            .require(admin_id, user_id, Some(UserRole::Admin))
            .await?;

        let work_path = paths::work(user_id, work_id);
        let mut data_err: Option<AppError> = None;
        let outcome = self
            .store
            .transact(
                &work_path,
                Box::new(|current| {
                    data_err = None;
                    let Some(value) = current else {
                        data_err = Some(AppError::EntityFailIdNotFound {
                            ident: work_path.clone(),
                        });
                        return TxDecision::Abort;
                    };
                    let work = match Work::parse(&work_path, value) {
                        Ok(work) => work,
                        Err(err) => {
                            data_err = Some(err);
                            return TxDecision::Abort;
                        }
                    };
                    if work.status != WorkStatus::Pending {
                        return TxDecision::Abort;
                    }
                    let mut obj = value.as_object().cloned().unwrap_or_default();
                    obj.insert("status".to_string(), json!(WorkStatus::Rejected));
                    TxDecision::Commit(Value::Object(obj))
                }),
            )
            .await
            .map_err(CtxError::from(self.ctx))?;
        if let Some(err) = data_err {
            return Err(self.ctx.to_ctx_error(err));
        }
        if !outcome.committed {
            return Ok(false);
        }

        let mut saga = Saga::new("reject_work_and_release_slot");
        let store = self.store;
        let rollback_work_path = paths::work(user_id, work_id);
        saga.on_rollback("restore work to pending", async move {
            store
                .update(&rollback_work_path, json!({ "status": WorkStatus::Pending }))
                .await
        });

        let campaign_path = paths::campaign(campaign_id);
        let mut data_err: Option<AppError> = None;
        let campaign_outcome = self
            .store
            .transact(
                &campaign_path,
                Box::new(|current| {
                    data_err = None;
                    let Some(value) = current else {
                        data_err = Some(AppError::EntityFailIdNotFound {
                            ident: campaign_path.clone(),
                        });
                        return TxDecision::Abort;
                    };
                    let mut obj = value.as_object().cloned().unwrap_or_default();
                    let completed = obj
                        .get("completedWorkers")
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    obj.insert(
                        "completedWorkers".to_string(),
                        json!(completed.saturating_sub(1)),
                    );
                    TxDecision::Commit(Value::Object(obj))
                }),
            )
            .await;
        match campaign_outcome {
            Err(err) => {
                saga.unwind().await;
                return Err(self.ctx.to_ctx_error(err));
            }
            Ok(_) => {
                if let Some(err) = data_err {
                    saga.unwind().await;
                    return Err(self.ctx.to_ctx_error(err));
                }
            }
        }

        saga.commit();
        self.cache.clear(&keys::campaign(campaign_id));
        self.cache.clear(&keys::works(user_id));
        Ok(true)
    }
}
