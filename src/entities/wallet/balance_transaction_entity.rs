use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::Display;
use tracing::warn;

use crate::database::store::{paths, DocumentStore};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxError, CtxResult};
use crate::middleware::utils::validation::{
    check_amount, violations_to_strings, FieldViolation, ValidationResult,
};

pub const MAX_TRANSACTION_AMOUNT: f64 = 100_000.0;

/// Tolerated clock drift on `createdAt`; records dated further into the
/// future are rejected.
pub const CREATED_AT_DRIFT_MS: i64 = 60_000;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    AddMoney,
    Withdrawal,
    Earning,
    CampaignSpend,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
    /// Post-hoc marker for an audit entry whose paired wallet step never
    /// landed. Never valid at creation.
    Failed,
}

/// Append-only audit entry, created alongside every wallet adjustment at
/// `transactions/{uid}/{pushId}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub r#type: TransactionType,
    pub amount: f64,
    pub status: TransactionStatus,
    pub created_at: i64,
}

impl TransactionRecord {
    pub fn new(r#type: TransactionType, amount: f64, status: TransactionStatus) -> Self {
        Self {
            r#type,
            amount,
            status,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Validity of a record about to be appended.
    pub fn validate_new(&self) -> ValidationResult {
        let mut violations = Vec::new();
        check_amount(&mut violations, "amount", self.amount, 0.0, MAX_TRANSACTION_AMOUNT);
        if self.amount == 0.0 {
            violations.push(FieldViolation::new("amount", "must be greater than 0"));
        }
        if self.status == TransactionStatus::Failed {
            violations.push(FieldViolation::new(
                "status",
                "cannot be created as failed",
            ));
        }
        let now = Utc::now().timestamp_millis();
        if self.created_at > now + CREATED_AT_DRIFT_MS {
            violations.push(FieldViolation::new("createdAt", "is in the future"));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("transaction record serializes")
    }
}

pub struct BalanceTransactionDbService<'a, S: DocumentStore> {
    pub store: &'a S,
    pub ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> BalanceTransactionDbService<'a, S> {
    /// Appends the audit record and returns its push key.
    pub async fn create(&self, uid: &str, record: &TransactionRecord) -> CtxResult<String> {
        record
            .validate_new()
            .map_err(|v| {
                self.ctx.to_ctx_error(AppError::Validation {
                    source: violations_to_strings(&v).join(", "),
                })
            })?;
        let push_id = self
            .store
            .push(&paths::transactions(uid))
            .await
            .map_err(CtxError::from(self.ctx))?;
        self.store
            .set(&paths::transaction(uid, &push_id), record.to_value())
            .await
            .map_err(CtxError::from(self.ctx))?;
        Ok(push_id)
    }

    /// Marks an already-appended audit record failed. Best-effort: the
    /// record is never deleted, a partial failure stays visible.
    pub async fn mark_failed(&self, uid: &str, push_id: &str) {
        let result = self
            .store
            .update(
                &paths::transaction(uid, push_id),
                json!({ "status": TransactionStatus::Failed }),
            )
            .await;
        if let Err(err) = result {
            warn!("->> could not mark transaction {push_id} of {uid} failed: {err}");
        }
    }

    /// Audit entries of one user, newest first.
    pub async fn user_transaction_list(&self, uid: &str) -> CtxResult<Vec<TransactionRecord>> {
        let tree = self
            .store
            .get(&paths::transactions(uid))
            .await
            .map_err(CtxError::from(self.ctx))?;
        let mut records: Vec<TransactionRecord> = match tree {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(_, v)| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        };
        records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(records)
    }
}
