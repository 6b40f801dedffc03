use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use validator::Validate;

use crate::database::read_cache::{keys, ReadCache};
use crate::database::store::{paths, DocumentStore};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, AppResult, CtxError, CtxResult};
use crate::middleware::utils::validation::{
    check_amount, check_non_negative, check_not_empty, check_text_len, FieldViolation,
    ValidationResult,
};

pub const MAX_TOTAL_WORKERS: u32 = 10_000;
pub const MIN_REWARD_PER_WORKER: f64 = 0.5;
pub const MAX_REWARD_PER_WORKER: f64 = 10_000.0;
pub const MAX_BUDGET: f64 = 10_000_000.0;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

/// A funded batch of micro-tasks created by one user for others to
/// complete. `remainingBudget` tracks the unfunded share of
/// `totalBudget` and never exceeds it; `completedWorkers` counts
/// accepted applications.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator_id: String,
    pub total_workers: u32,
    pub reward_per_worker: f64,
    pub total_budget: f64,
    pub remaining_budget: f64,
    pub completed_workers: u32,
    pub status: CampaignStatus,
    pub created_at: i64,
    pub priority: u32,
    pub category: String,
}

impl Campaign {
    pub fn validate(&self) -> ValidationResult {
        let mut violations = Vec::new();
        check_not_empty(&mut violations, "id", &self.id);
        check_not_empty(&mut violations, "creatorId", &self.creator_id);
        check_text_len(&mut violations, "title", &self.title, 1, 100);
        check_text_len(&mut violations, "description", &self.description, 1, 1000);
        if self.total_workers < 1 || self.total_workers > MAX_TOTAL_WORKERS {
            violations.push(FieldViolation::new(
                "totalWorkers",
                format!("must be between 1 and {MAX_TOTAL_WORKERS}"),
            ));
        }
        check_amount(
            &mut violations,
            "rewardPerWorker",
            self.reward_per_worker,
            MIN_REWARD_PER_WORKER,
            MAX_REWARD_PER_WORKER,
        );
        check_non_negative(&mut violations, "totalBudget", self.total_budget, MAX_BUDGET);
        check_non_negative(
            &mut violations,
            "remainingBudget",
            self.remaining_budget,
            MAX_BUDGET,
        );
        if self.remaining_budget > self.total_budget {
            violations.push(FieldViolation::new(
                "remainingBudget",
                "exceeds totalBudget",
            ));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    pub fn parse(ident: &str, value: &Value) -> AppResult<Campaign> {
        let campaign: Campaign =
            serde_json::from_value(value.clone()).map_err(|e| AppError::DataIntegrity {
                ident: ident.to_string(),
                violations: vec![e.to_string()],
            })?;
        Ok(campaign)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("campaign serializes")
    }
}

/// Creation input, validated before any I/O.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CampaignInput {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000, message = "Description must be 1-1000 characters"))]
    pub description: String,
    #[validate(range(min = 1, max = 10_000))]
    pub total_workers: u32,
    #[validate(range(min = 0.5, max = 10_000.0))]
    pub reward_per_worker: f64,
    pub priority: u32,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
}

pub struct CampaignDbService<'a, S: DocumentStore> {
    pub store: &'a S,
    pub cache: &'a ReadCache,
    pub ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> CampaignDbService<'a, S> {
    /// Read-through cached campaign; missing id is a not-found error,
    /// a malformed stored record a data-integrity one.
    pub async fn get(&self, campaign_id: &str) -> CtxResult<Campaign> {
        let path = paths::campaign(campaign_id);
        let store = self.store;
        let fetch_path = path.clone();
        let value = self
            .cache
            .get_or_fetch(&keys::campaign(campaign_id), async move {
                Ok(store.get(&fetch_path).await?.unwrap_or(Value::Null))
            })
            .await
            .map_err(CtxError::from(self.ctx))?;
        if value.is_null() {
            return Err(self
                .ctx
                .to_ctx_error(AppError::EntityFailIdNotFound { ident: path }));
        }
        Campaign::parse(&path, &value).map_err(CtxError::from(self.ctx))
    }
}
