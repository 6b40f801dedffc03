use tracing::warn;

use crate::database::read_cache::ReadCache;
use crate::database::store::DocumentStore;
use crate::entities::user_auth::local_user_entity::{LocalUserDbService, UserRole};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};

/// Decides whether an acting identity may operate on a target identity's
/// resources: self-service, or an unblocked admin.
pub struct AccessService<'a, S: DocumentStore> {
    pub store: &'a S,
    pub cache: &'a ReadCache,
    pub ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> AccessService<'a, S> {
    /// Never errors: a missing or malformed acting-user record, or a
    /// store failure, answers false. Callers decide whether false is
    /// fatal.
    pub async fn authorize(
        &self,
        acting_id: &str,
        target_id: &str,
        required: Option<UserRole>,
    ) -> bool {
        match required {
            Some(UserRole::Admin) => self.is_active_admin(acting_id).await,
            _ => acting_id == target_id || self.is_active_admin(acting_id).await,
        }
    }

    /// Authorization gate of the ledger operations: a supplied acting id
    /// must pass [`Self::authorize`]; no acting id means a trusted
    /// internal caller.
    pub async fn require(
        &self,
        acting_id: Option<&str>,
        target_id: &str,
        required: Option<UserRole>,
    ) -> CtxResult<()> {
        let Some(acting_id) = acting_id else {
            return Ok(());
        };
        if self.authorize(acting_id, target_id, required).await {
            Ok(())
        } else {
            let required = match required {
                Some(role) => role.to_string(),
                None => "self or admin".to_string(),
            };
            Err(self
                .ctx
                .to_ctx_error(AppError::AuthorizationFail { required }))
        }
    }

    async fn is_active_admin(&self, uid: &str) -> bool {
        let users = LocalUserDbService {
            store: self.store,
            cache: self.cache,
            ctx: self.ctx,
        };
        match users.try_get(uid).await {
            Ok(Some(user)) => user.role == UserRole::Admin && !user.is_blocked,
            Ok(None) => false,
            Err(err) => {
                warn!("->> admin check for {uid} failed: {}", err.error);
                false
            }
        }
    }
}
