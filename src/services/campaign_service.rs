use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::database::read_cache::{keys, ReadCache};
use crate::database::saga::Saga;
use crate::database::store::{paths, DocumentStore, TxDecision};
use crate::entities::campaign::campaign_entity::{
    Campaign, CampaignDbService, CampaignInput, CampaignStatus, MAX_REWARD_PER_WORKER,
};
use crate::entities::campaign::work_entity::{Work, WorkStatus};
use crate::entities::wallet::wallet_entity::Wallet;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxError, CtxResult};
use crate::middleware::utils::validation::violations_to_strings;
use crate::services::access_service::AccessService;

/// Campaign-side ledger operations: creation with paired funding, the
/// two-phase budget deduction, and worker application.
pub struct CampaignService<'a, S: DocumentStore> {
    store: &'a S,
    cache: &'a ReadCache,
    ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> CampaignService<'a, S> {
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

    fn campaigns(&self) -> CampaignDbService<'a, S> {
        CampaignDbService {
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

    pub async fn get_campaign(&self, campaign_id: &str) -> CtxResult<Campaign> {
        self.campaigns().get(campaign_id).await
    }

    /// Creates and funds a campaign: the document is written with the
    /// full budget outstanding, then funded through
    /// [`Self::deduct_campaign_budget`] against the creator's added
    /// balance. When funding does not apply the document is removed and
    /// None is returned.
    pub async fn create_campaign(
        &self,
        creator_id: &str,
        input: CampaignInput,
        acting_id: Option<&str>,
    ) -> CtxResult<Option<Campaign>> {
        input.validate()?;
        self.require_id("creatorId", creator_id)?;
        self.access().require(acting_id, creator_id, None).await?;

        let total_budget = input.total_workers as f64 * input.reward_per_worker;
        let mut campaign = Campaign {
            id: Uuid::new_v4().simple().to_string(),
            title: input.title,
            description: input.description,
            creator_id: creator_id.to_string(),
            total_workers: input.total_workers,
            reward_per_worker: input.reward_per_worker,
            total_budget,
            remaining_budget: total_budget,
            completed_workers: 0,
            status: CampaignStatus::Active,
            created_at: Utc::now().timestamp_millis(),
            priority: input.priority,
            category: input.category,
        };
        campaign.validate().map_err(|v| {
            self.ctx.to_ctx_error(AppError::Validation {
                source: violations_to_strings(&v).join(", "),
            })
        })?;

        let campaign_path = paths::campaign(&campaign.id);
        self.store
            .set(&campaign_path, campaign.to_value())
            .await
            .map_err(CtxError::from(self.ctx))?;

        let mut saga = Saga::new("create_campaign");
        let store = self.store;
        let created_path = campaign_path.clone();
        saga.on_rollback("remove unfunded campaign", async move {
            store.set(&created_path, Value::Null).await
        });

        match self
            .deduct_campaign_budget(&campaign.id, total_budget, creator_id, None)
            .await
        {
            Ok(true) => {
                saga.commit();
                campaign.remaining_budget = 0.0;
                Ok(Some(campaign))
            }
            Ok(false) => {
                saga.unwind().await;
                self.cache.clear(&keys::campaign(&campaign.id));
                Ok(None)
            }
            Err(err) => {
                saga.unwind().await;
                self.cache.clear(&keys::campaign(&campaign.id));
                Err(err)
            }
        }
    }

    /// Two-phase funding deduction: campaign `remainingBudget` first,
    /// creator wallet `addedBalance` second; a wallet-side abort or
    /// failure restores the campaign decrement.
    pub async fn deduct_campaign_budget(
        &self,
        campaign_id: &str,
        amount: f64,
        uid: &str,
        acting_id: Option<&str>,
    ) -> CtxResult<bool> {
        self.require_id("campaignId", campaign_id)?;
        self.require_id("uid", uid)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: "amount must be a positive number".to_string(),
            }));
        }
        self.access().require(acting_id, uid, None).await?;

        // phase 1: campaign decrement
        let campaign_path = paths::campaign(campaign_id);
        let mut data_err: Option<AppError> = None;
        let outcome = self
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
                    let campaign = match Campaign::parse(&campaign_path, value) {
                        Ok(campaign) => campaign,
                        Err(err) => {
                            data_err = Some(err);
                            return TxDecision::Abort;
                        }
                    };
                    if let Err(violations) = campaign.validate() {
                        data_err = Some(AppError::DataIntegrity {
                            ident: campaign_path.clone(),
                            violations: violations_to_strings(&violations),
                        });
                        return TxDecision::Abort;
                    }
                    if campaign.remaining_budget < amount {
                        return TxDecision::Abort;
                    }
                    let mut obj = value.as_object().cloned().unwrap_or_default();
                    obj.insert(
                        "remainingBudget".to_string(),
                        json!(campaign.remaining_budget - amount),
                    );
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

        let mut saga = Saga::new("deduct_campaign_budget");
        let store = self.store;
        let restore_path = paths::campaign(campaign_id);
        saga.on_rollback("restore campaign budget", async move {
            store
                .transact(
                    &restore_path,
                    Box::new(|current| {
                        let Some(value) = current else {
                            return TxDecision::Abort;
                        };
                        let mut obj = value.as_object().cloned().unwrap_or_default();
                        let remaining = obj
                            .get("remainingBudget")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.0);
                        let total = obj
                            .get("totalBudget")
                            .and_then(Value::as_f64)
                            .unwrap_or(remaining + amount);
                        obj.insert(
                            "remainingBudget".to_string(),
                            json!((remaining + amount).min(total)),
                        );
                        TxDecision::Commit(Value::Object(obj))
                    }),
                )
                .await
                .map(|_| ())
        });

        // phase 2: wallet decrement
        let wallet_path = paths::wallet(uid);
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
                    if wallet.added_balance < amount {
                        return TxDecision::Abort;
                    }
                    let next = Wallet {
                        added_balance: wallet.added_balance - amount,
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
                self.cache.clear(&keys::campaign(campaign_id));
                return Err(self.ctx.to_ctx_error(err));
            }
            Ok(outcome) => {
                if let Some(err) = data_err {
                    saga.unwind().await;
                    self.cache.clear(&keys::campaign(campaign_id));
                    return Err(self.ctx.to_ctx_error(err));
                }
                outcome.committed
            }
        };
        if !committed {
            saga.unwind().await;
            self.cache.clear(&keys::campaign(campaign_id));
            return Ok(false);
        }

        saga.commit();
        self.cache.clear(&keys::campaign(campaign_id));
        self.cache.clear(&keys::wallet(uid));
        Ok(true)
    }

    /// Worker application. Guarded against duplicate application by the
    /// existing work item at `works/{uid}/{campaignId}`; requires an
    /// active campaign with a free slot.
    ///
    /// The capacity check runs before the work item is written and the
    /// `completedWorkers` increment is a separate transaction, so two
    /// concurrent applies near capacity can both be admitted; the
    /// increment itself never loses updates.
    pub async fn apply_to_campaign(
        &self,
        campaign_id: &str,
        user_id: &str,
        user_name: &str,
        reward: f64,
        acting_id: Option<&str>,
    ) -> CtxResult<bool> {
        self.require_id("campaignId", campaign_id)?;
        self.require_id("userId", user_id)?;
        self.require_id("userName", user_name)?;
        if !reward.is_finite() || reward <= 0.0 || reward > MAX_REWARD_PER_WORKER {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: format!("reward must be between 0 and {MAX_REWARD_PER_WORKER}"),
            }));
        }
        self.access().require(acting_id, user_id, None).await?;

        let work_path = paths::work(user_id, campaign_id);
        let existing = self
            .store
            .get(&work_path)
            .await
            .map_err(CtxError::from(self.ctx))?;
        if existing.is_some() {
            return Ok(false);
        }

        let campaign = self.campaigns().get(campaign_id).await?;
        campaign.validate().map_err(|v| {
            self.ctx.to_ctx_error(AppError::DataIntegrity {
                ident: paths::campaign(campaign_id),
                violations: violations_to_strings(&v),
            })
        })?;
        if campaign.status != CampaignStatus::Active
            || campaign.completed_workers >= campaign.total_workers
        {
            return Ok(false);
        }

        let work = Work {
            id: campaign_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            campaign_id: campaign_id.to_string(),
            proof_url: None,
            status: WorkStatus::Pending,
            submitted_at: Utc::now().timestamp_millis(),
            reward,
        };
        self.store
            .set(&work_path, work.to_value())
            .await
            .map_err(CtxError::from(self.ctx))?;

        let mut saga = Saga::new("apply_to_campaign");
        let store = self.store;
        let created_work_path = work_path.clone();
        saga.on_rollback("remove work item", async move {
            store.set(&created_work_path, Value::Null).await
        });

        let campaign_path = paths::campaign(campaign_id);
        let mut data_err: Option<AppError> = None;
        let outcome = self
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
                    obj.insert("completedWorkers".to_string(), json!(completed + 1));
                    TxDecision::Commit(Value::Object(obj))
                }),
            )
            .await;

        match outcome {
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
