use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::read_cache::{keys, ReadCache};
use crate::database::store::{paths, DocumentStore};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, AppResult, CtxError, CtxResult};
use crate::middleware::utils::validation::{
    check_non_negative, violations_to_strings, ValidationResult,
};

/// Upper bound on every wallet balance field.
pub const MAX_BALANCE: f64 = 10_000_000.0;

/// Per-user ledger of earned vs. added funds and withdrawal history.
/// All four fields are non-negative and bounded by [`MAX_BALANCE`];
/// mutated only inside store transactions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub earned_balance: f64,
    pub added_balance: f64,
    pub pending_add_money: f64,
    pub total_withdrawn: f64,
}

/// Additive adjustment of the four wallet fields. Applying a delta
/// floors each resulting field at 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WalletDelta {
    pub earned_balance: f64,
    pub added_balance: f64,
    pub pending_add_money: f64,
    pub total_withdrawn: f64,
}

/// Partial replacement of wallet fields, merged over the current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WalletPatch {
    pub earned_balance: Option<f64>,
    pub added_balance: Option<f64>,
    pub pending_add_money: Option<f64>,
    pub total_withdrawn: Option<f64>,
}

impl Wallet {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> ValidationResult {
        let mut violations = Vec::new();
        check_non_negative(
            &mut violations,
            "earnedBalance",
            self.earned_balance,
            MAX_BALANCE,
        );
        check_non_negative(
            &mut violations,
            "addedBalance",
            self.added_balance,
            MAX_BALANCE,
        );
        check_non_negative(
            &mut violations,
            "pendingAddMoney",
            self.pending_add_money,
            MAX_BALANCE,
        );
        check_non_negative(
            &mut violations,
            "totalWithdrawn",
            self.total_withdrawn,
            MAX_BALANCE,
        );
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    pub fn apply(&self, delta: &WalletDelta) -> Wallet {
        Wallet {
            earned_balance: (self.earned_balance + delta.earned_balance).max(0.0),
            added_balance: (self.added_balance + delta.added_balance).max(0.0),
            pending_add_money: (self.pending_add_money + delta.pending_add_money).max(0.0),
            total_withdrawn: (self.total_withdrawn + delta.total_withdrawn).max(0.0),
        }
    }

    pub fn merge(&self, patch: &WalletPatch) -> Wallet {
        Wallet {
            earned_balance: patch.earned_balance.unwrap_or(self.earned_balance),
            added_balance: patch.added_balance.unwrap_or(self.added_balance),
            pending_add_money: patch.pending_add_money.unwrap_or(self.pending_add_money),
            total_withdrawn: patch.total_withdrawn.unwrap_or(self.total_withdrawn),
        }
    }

    /// Decodes and validates a stored wallet value; a structurally
    /// invalid record is a hard data-integrity failure, never a default.
    pub fn parse(ident: &str, value: &Value) -> AppResult<Wallet> {
        let wallet: Wallet =
            serde_json::from_value(value.clone()).map_err(|e| AppError::DataIntegrity {
                ident: ident.to_string(),
                violations: vec![e.to_string()],
            })?;
        wallet.validate().map_err(|v| AppError::DataIntegrity {
            ident: ident.to_string(),
            violations: violations_to_strings(&v),
        })?;
        Ok(wallet)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("wallet serializes")
    }
}

pub struct WalletDbService<'a, S: DocumentStore> {
    pub store: &'a S,
    pub cache: &'a ReadCache,
    pub ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> WalletDbService<'a, S> {
    /// Read-through cached wallet. A user that never moved money has no
    /// wallet document; that reads as the all-zero wallet.
    pub async fn get(&self, uid: &str) -> CtxResult<Wallet> {
        let path = paths::wallet(uid);
        let store = self.store;
        let fetch_path = path.clone();
        let value = self
            .cache
            .get_or_fetch(&keys::wallet(uid), async move {
                Ok(store.get(&fetch_path).await?.unwrap_or(Value::Null))
            })
            .await
            .map_err(CtxError::from(self.ctx))?;
        if value.is_null() {
            return Ok(Wallet::zero());
        }
        Wallet::parse(&path, &value).map_err(CtxError::from(self.ctx))
    }
}
