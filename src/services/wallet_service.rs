use serde_json::{json, Value};
use tracing::warn;

use crate::database::read_cache::{keys, ReadCache};
use crate::database::saga::Saga;
use crate::database::store::{paths, DocumentStore, TxDecision};
use crate::entities::user_auth::local_user_entity::UserRole;
use crate::entities::wallet::balance_transaction_entity::{
    BalanceTransactionDbService, TransactionRecord, TransactionStatus, TransactionType,
};
use crate::entities::wallet::money_request_entity::{
    MoneyRequest, MoneyRequestDbService, MoneyRequestStatus, MoneyRequestType,
};
use crate::entities::wallet::wallet_entity::{Wallet, WalletDbService, WalletDelta, WalletPatch};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxError, CtxResult};
use crate::services::access_service::AccessService;

/// Wallet-side ledger operations: the generic balance primitive, the
/// audited adjustment, and admin money-request processing.
///
/// Return contract shared by every operation here: `Ok(false)` means the
/// operation legitimately did not apply (insufficient balance, record
/// not pending, post-state out of bounds); errors are reserved for
/// invalid input, failed authorization, broken stored data and store
/// failures.
pub struct WalletService<'a, S: DocumentStore> {
    store: &'a S,
    cache: &'a ReadCache,
    ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> WalletService<'a, S> {
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

    fn transactions(&self) -> BalanceTransactionDbService<'a, S> {
        BalanceTransactionDbService {
            store: self.store,
            ctx: self.ctx,
        }
    }

    pub async fn get_balance(&self, uid: &str) -> CtxResult<Wallet> {
        WalletDbService {
            store: self.store,
            cache: self.cache,
            ctx: self.ctx,
        }
        .get(uid)
        .await
    }

    fn require_id(&self, field: &str, value: &str) -> CtxResult<()> {
        if value.trim().is_empty() {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: format!("{field} is required"),
            }));
        }
        Ok(())
    }

    fn require_finite_delta(&self, delta: &WalletDelta) -> CtxResult<()> {
        let fields = [
            ("earnedBalance", delta.earned_balance),
            ("addedBalance", delta.added_balance),
            ("pendingAddMoney", delta.pending_add_money),
            ("totalWithdrawn", delta.total_withdrawn),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(self.ctx.to_ctx_error(AppError::Validation {
                    source: format!("{field} delta must be a finite number"),
                }));
            }
        }
        Ok(())
    }

    /// Generic balance primitive: runs `update_fn` over the current
    /// wallet inside a store transaction, merges the returned patch,
    /// re-validates and commits. `update_fn` returning None aborts.
    pub async fn update_wallet_balance<F>(
        &self,
        uid: &str,
        mut update_fn: F,
        acting_id: Option<&str>,
    ) -> CtxResult<bool>
    where
        F: FnMut(&Wallet) -> Option<WalletPatch> + Send,
    {
        self.require_id("uid", uid)?;
        self.access().require(acting_id, uid, None).await?;

        let path = paths::wallet(uid);
        let mut data_err: Option<AppError> = None;
        let outcome = self
            .store
            .transact(
                &path,
                Box::new(|current| {
                    data_err = None;
                    let wallet = match current {
                        None => Wallet::zero(),
                        Some(value) => match Wallet::parse(&path, value) {
                            Ok(wallet) => wallet,
                            Err(err) => {
                                data_err = Some(err);
                                return TxDecision::Abort;
                            }
                        },
                    };
                    let Some(patch) = update_fn(&wallet) else {
                        return TxDecision::Abort;
                    };
                    let next = wallet.merge(&patch);
                    if next.validate().is_err() {
                        return TxDecision::Abort;
                    }
                    TxDecision::Commit(next.to_value())
                }),
            )
            .await
            .map_err(CtxError::from(self.ctx))?;
        if let Some(err) = data_err {
            return Err(self.ctx.to_ctx_error(err));
        }
        if outcome.committed {
            self.cache.clear(&keys::wallet(uid));
        }
        Ok(outcome.committed)
    }

    /// Appends an audit record, then adjusts the four wallet fields by
    /// `delta` (each result floored at 0) in one wallet transaction.
    ///
    /// The audit write is not atomic with the wallet step: when the
    /// wallet step aborts or fails, the already-appended record is
    /// marked failed (best-effort) rather than deleted, so the partial
    /// failure stays visible.
    pub async fn create_transaction_and_adjust_wallet(
        &self,
        uid: &str,
        record: &TransactionRecord,
        delta: &WalletDelta,
        acting_id: Option<&str>,
    ) -> CtxResult<bool> {
        self.require_id("uid", uid)?;
        self.require_finite_delta(delta)?;
        self.access().require(acting_id, uid, None).await?;

        let push_id = self.transactions().create(uid, record).await?;

        let path = paths::wallet(uid);
        let mut data_err: Option<AppError> = None;
        let outcome = self
            .store
            .transact(
                &path,
                Box::new(|current| {
                    data_err = None;
                    let wallet = match current {
                        None => Wallet::zero(),
                        Some(value) => match Wallet::parse(&path, value) {
                            Ok(wallet) => wallet,
                            Err(err) => {
                                data_err = Some(err);
                                return TxDecision::Abort;
                            }
                        },
                    };
                    let next = wallet.apply(delta);
                    if next.validate().is_err() {
                        return TxDecision::Abort;
                    }
                    TxDecision::Commit(next.to_value())
                }),
            )
            .await;

        match outcome {
            Err(err) => {
                self.transactions().mark_failed(uid, &push_id).await;
                Err(self.ctx.to_ctx_error(err))
            }
            Ok(outcome) if !outcome.committed => {
                self.transactions().mark_failed(uid, &push_id).await;
                match data_err {
                    Some(err) => Err(self.ctx.to_ctx_error(err)),
                    None => Ok(false),
                }
            }
            Ok(_) => {
                self.cache.clear(&keys::wallet(uid));
                Ok(true)
            }
        }
    }

    /// Admin processing of an add-money or withdrawal request. The
    /// stored request must be pending and match the caller-supplied
    /// type, amount and user exactly (defense against replay and
    /// tampering). Wallet failure rolls the request back to pending.
    pub async fn process_money_request(
        &self,
        request_id: &str,
        r#type: MoneyRequestType,
        user_id: &str,
        amount: f64,
        status: MoneyRequestStatus,
        admin_id: Option<&str>,
    ) -> CtxResult<bool> {
        self.require_id("requestId", request_id)?;
        self.require_id("userId", user_id)?;
        let (min, max) = r#type.amount_bounds();
        if !amount.is_finite() || amount < min || amount > max {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: format!("{} amount must be between {min} and {max}", r#type),
            }));
        }
        if status == MoneyRequestStatus::Pending {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: "status must be approved or rejected".to_string(),
            }));
        }
        self.access()
            .require(admin_id, user_id, Some(UserRole::Admin))
            .await?;

        let request_path = r#type.request_path(request_id);
        let stored = MoneyRequestDbService {
            store: self.store,
            ctx: self.ctx,
        }
        .get(request_id, r#type)
        .await?;
        if stored.user_id != user_id || stored.r#type != r#type || stored.amount != amount {
            return Err(self.ctx.to_ctx_error(AppError::DataIntegrity {
                ident: request_path,
                violations: vec![
                    "stored request does not match the supplied type/amount/user".to_string(),
                ],
            }));
        }

        // request transition first; compensated if the money movement fails
        let mut data_err: Option<AppError> = None;
        let outcome = self
            .store
            .transact(
                &request_path,
                Box::new(|current| {
                    data_err = None;
                    let Some(value) = current else {
                        data_err = Some(AppError::EntityFailIdNotFound {
                            ident: request_path.clone(),
                        });
                        return TxDecision::Abort;
                    };
                    let request = match MoneyRequest::parse(&request_path, value) {
                        Ok(request) => request,
                        Err(err) => {
                            data_err = Some(err);
                            return TxDecision::Abort;
                        }
                    };
                    if request.status != MoneyRequestStatus::Pending {
                        return TxDecision::Abort;
                    }
                    let mut obj = value.as_object().cloned().unwrap_or_default();
                    obj.insert("status".to_string(), json!(status));
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

        let mut saga = Saga::new("process_money_request");
        let store = self.store;
        let rollback_path = r#type.request_path(request_id);
        saga.on_rollback("restore request to pending", async move {
            store
                .transact(
                    &rollback_path,
                    Box::new(|current| match current {
                        Some(value) => {
                            let mut obj = value.as_object().cloned().unwrap_or_default();
                            obj.insert("status".to_string(), json!(MoneyRequestStatus::Pending));
                            TxDecision::Commit(Value::Object(obj))
                        }
                        None => TxDecision::Abort,
                    }),
                )
                .await
                .map(|_| ())
        });

        if status == MoneyRequestStatus::Rejected {
            saga.commit();
            return Ok(true);
        }

        // approved: move the money
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
                    let next = match r#type {
                        MoneyRequestType::AddMoney => Wallet {
                            added_balance: wallet.added_balance + amount,
                            pending_add_money: (wallet.pending_add_money - amount).max(0.0),
                            ..wallet
                        },
                        MoneyRequestType::Withdrawal => {
                            if wallet.earned_balance < amount {
                                return TxDecision::Abort;
                            }
                            Wallet {
                                earned_balance: wallet.earned_balance - amount,
                                total_withdrawn: wallet.total_withdrawn + amount,
                                ..wallet
                            }
                        }
                    };
                    if next.validate().is_err() {
                        return TxDecision::Abort;
                    }
                    TxDecision::Commit(next.to_value())
                }),
            )
            .await;

        let wallet_outcome = match wallet_outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                saga.unwind().await;
                return Err(self.ctx.to_ctx_error(err));
            }
        };
        if let Some(err) = data_err {
            saga.unwind().await;
            return Err(self.ctx.to_ctx_error(err));
        }
        if !wallet_outcome.committed {
            saga.unwind().await;
            return Ok(false);
        }

        if r#type == MoneyRequestType::Withdrawal {
            let inverse = WalletDelta {
                earned_balance: amount,
                total_withdrawn: -amount,
                ..WalletDelta::default()
            };
            let comp_path = paths::wallet(user_id);
            saga.on_rollback("revert wallet debit", async move {
                store
                    .transact(
                        &comp_path,
                        Box::new(|current| {
                            let wallet = current
                                .and_then(|v| Wallet::parse(&comp_path, v).ok())
                                .unwrap_or_else(Wallet::zero);
                            TxDecision::Commit(wallet.apply(&inverse).to_value())
                        }),
                    )
                    .await
                    .map(|_| ())
            });

            // mirror the lifetime total on the profile
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
                        let total = obj
                            .get("totalWithdrawn")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.0);
                        obj.insert("totalWithdrawn".to_string(), json!(total + amount));
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
        }

        saga.commit();

        // audit trail, best-effort: the money already moved
        let record = match r#type {
            MoneyRequestType::AddMoney => TransactionRecord::new(
                TransactionType::AddMoney,
                amount,
                TransactionStatus::Approved,
            ),
            MoneyRequestType::Withdrawal => TransactionRecord::new(
                TransactionType::Withdrawal,
                amount,
                TransactionStatus::Paid,
            ),
        };
        if let Err(err) = self.transactions().create(user_id, &record).await {
            warn!(
                "->> money request {request_id}: audit record failed: {}",
                err.error
            );
        }

        self.cache.clear(&keys::wallet(user_id));
        self.cache.clear(&keys::user(user_id));
        Ok(true)
    }
}
