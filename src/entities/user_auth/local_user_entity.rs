use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::database::read_cache::{keys, ReadCache};
use crate::database::store::{paths, DocumentStore};
use crate::entities::wallet::wallet_entity::Wallet;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, AppResult, CtxError, CtxResult};
use crate::middleware::utils::validation::{
    check_non_negative, check_not_empty, violations_to_strings, ValidationResult,
};

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

/// Profile record at `users/{uid}`. The earning counters mirror wallet
/// movements and are maintained by the ledger operations; everything
/// else is profile data owned by the (out-of-scope) account screens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalUser {
    pub uid: String,
    pub email: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_links: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub is_blocked: bool,
    pub created_at: i64,
    #[serde(default)]
    pub earned_money: f64,
    #[serde(default)]
    pub added_money: f64,
    #[serde(default)]
    pub approved_works: u32,
    #[serde(default)]
    pub total_withdrawn: f64,
}

impl LocalUser {
    pub fn new(uid: String, email: String, full_name: String) -> Self {
        Self {
            uid,
            email,
            full_name,
            bio: None,
            social_links: None,
            profile_image: None,
            role: UserRole::User,
            is_blocked: false,
            created_at: Utc::now().timestamp_millis(),
            earned_money: 0.0,
            added_money: 0.0,
            approved_works: 0,
            total_withdrawn: 0.0,
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut violations = Vec::new();
        check_not_empty(&mut violations, "uid", &self.uid);
        check_not_empty(&mut violations, "email", &self.email);
        check_non_negative(&mut violations, "earnedMoney", self.earned_money, f64::MAX);
        check_non_negative(&mut violations, "addedMoney", self.added_money, f64::MAX);
        check_non_negative(
            &mut violations,
            "totalWithdrawn",
            self.total_withdrawn,
            f64::MAX,
        );
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    pub fn parse(ident: &str, value: &Value) -> AppResult<LocalUser> {
        serde_json::from_value(value.clone()).map_err(|e| AppError::DataIntegrity {
            ident: ident.to_string(),
            violations: vec![e.to_string()],
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("user serializes")
    }
}

pub struct LocalUserDbService<'a, S: DocumentStore> {
    pub store: &'a S,
    pub cache: &'a ReadCache,
    pub ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> LocalUserDbService<'a, S> {
    /// Read-through cached profile.
    pub async fn get(&self, uid: &str) -> CtxResult<LocalUser> {
        self.try_get(uid).await?.ok_or_else(|| {
            self.ctx.to_ctx_error(AppError::EntityFailIdNotFound {
                ident: paths::user(uid),
            })
        })
    }

    pub async fn try_get(&self, uid: &str) -> CtxResult<Option<LocalUser>> {
        let path = paths::user(uid);
        let store = self.store;
        let fetch_path = path.clone();
        let value = self
            .cache
            .get_or_fetch(&keys::user(uid), async move {
                Ok(store.get(&fetch_path).await?.unwrap_or(Value::Null))
            })
            .await
            .map_err(CtxError::from(self.ctx))?;
        if value.is_null() {
            return Ok(None);
        }
        LocalUser::parse(&path, &value)
            .map(Some)
            .map_err(CtxError::from(self.ctx))
    }

    /// Sign-up seeding: the profile and its all-zero wallet.
    pub async fn create_with_wallet(&self, user: &LocalUser) -> CtxResult<()> {
        user.validate().map_err(|v| {
            self.ctx.to_ctx_error(AppError::Validation {
                source: violations_to_strings(&v).join(", "),
            })
        })?;
        self.store
            .set(&paths::user(&user.uid), user.to_value())
            .await
            .map_err(CtxError::from(self.ctx))?;
        self.store
            .set(&paths::wallet(&user.uid), Wallet::zero().to_value())
            .await
            .map_err(CtxError::from(self.ctx))?;
        self.cache.clear_user(&user.uid);
        Ok(())
    }
}
