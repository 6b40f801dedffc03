use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::database::store::{paths, DocumentStore};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, AppResult, CtxError, CtxResult};
use crate::middleware::utils::validation::{
    check_amount, check_not_empty, FieldViolation, ValidationResult,
};

pub const MAX_REWARD: f64 = 10_000.0;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkStatus {
    Pending,
    Approved,
    Rejected,
}

/// One worker's application/submission/review record against a campaign,
/// stored at `works/{uid}/{workId}`. The reward is fixed at creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Work {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_url: Option<String>,
    pub status: WorkStatus,
    pub submitted_at: i64,
    pub reward: f64,
}

impl Work {
    pub fn validate(&self) -> ValidationResult {
        let mut violations = Vec::new();
        check_not_empty(&mut violations, "id", &self.id);
        check_not_empty(&mut violations, "userId", &self.user_id);
        check_not_empty(&mut violations, "campaignId", &self.campaign_id);
        check_amount(&mut violations, "reward", self.reward, 0.0, MAX_REWARD);
        if self.reward == 0.0 {
            violations.push(FieldViolation::new("reward", "must be greater than 0"));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    pub fn parse(ident: &str, value: &Value) -> AppResult<Work> {
        serde_json::from_value(value.clone()).map_err(|e| AppError::DataIntegrity {
            ident: ident.to_string(),
            violations: vec![e.to_string()],
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("work serializes")
    }
}

pub struct WorkDbService<'a, S: DocumentStore> {
    pub store: &'a S,
    pub ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> WorkDbService<'a, S> {
    pub async fn get(&self, uid: &str, work_id: &str) -> CtxResult<Option<Work>> {
        let path = paths::work(uid, work_id);
        let value = self
            .store
            .get(&path)
            .await
            .map_err(CtxError::from(self.ctx))?;
        match value {
            Some(value) => Work::parse(&path, &value)
                .map(Some)
                .map_err(CtxError::from(self.ctx)),
            None => Ok(None),
        }
    }
}
