use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::database::store::{paths, DocumentStore};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, AppResult, CtxError, CtxResult};
use crate::middleware::utils::validation::{check_amount, check_not_empty, ValidationResult};

pub const ADD_MONEY_MIN: f64 = 10.0;
pub const ADD_MONEY_MAX: f64 = 100_000.0;
pub const WITHDRAWAL_MIN: f64 = 500.0;
pub const WITHDRAWAL_MAX: f64 = 50_000.0;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MoneyRequestType {
    AddMoney,
    Withdrawal,
}

impl MoneyRequestType {
    /// Per-type amount bounds.
    pub fn amount_bounds(&self) -> (f64, f64) {
        match self {
            MoneyRequestType::AddMoney => (ADD_MONEY_MIN, ADD_MONEY_MAX),
            MoneyRequestType::Withdrawal => (WITHDRAWAL_MIN, WITHDRAWAL_MAX),
        }
    }

    pub fn request_path(&self, request_id: &str) -> String {
        match self {
            MoneyRequestType::AddMoney => paths::add_money_request(request_id),
            MoneyRequestType::Withdrawal => paths::withdrawal_request(request_id),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MoneyRequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// Add-money or withdrawal request awaiting admin processing. Created by
/// the payment-gateway collaborator; this crate only consumes and
/// transitions it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyRequest {
    pub user_id: String,
    pub r#type: MoneyRequestType,
    pub amount: f64,
    pub status: MoneyRequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl MoneyRequest {
    pub fn validate(&self) -> ValidationResult {
        let mut violations = Vec::new();
        check_not_empty(&mut violations, "userId", &self.user_id);
        let (min, max) = self.r#type.amount_bounds();
        check_amount(&mut violations, "amount", self.amount, min, max);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    pub fn parse(ident: &str, value: &Value) -> AppResult<MoneyRequest> {
        serde_json::from_value(value.clone()).map_err(|e| AppError::DataIntegrity {
            ident: ident.to_string(),
            violations: vec![e.to_string()],
        })
    }
}

pub struct MoneyRequestDbService<'a, S: DocumentStore> {
    pub store: &'a S,
    pub ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> MoneyRequestDbService<'a, S> {
    pub async fn get(
        &self,
        request_id: &str,
        r#type: MoneyRequestType,
    ) -> CtxResult<MoneyRequest> {
        let path = r#type.request_path(request_id);
        let value = self
            .store
            .get(&path)
            .await
            .map_err(CtxError::from(self.ctx))?
            .ok_or_else(|| {
                self.ctx
                    .to_ctx_error(AppError::EntityFailIdNotFound { ident: path.clone() })
            })?;
        MoneyRequest::parse(&path, &value).map_err(CtxError::from(self.ctx))
    }
}
