use uuid::Uuid;

use super::error::{AppError, AppResult, CtxError, CtxResult};

/// Per-request context created by the calling layer. Carries the acting
/// user id (or the auth failure that prevented resolving one) and the
/// request id attached to every error.
#[derive(Clone, Debug)]
pub struct Ctx {
    result_user_id: AppResult<String>,
    req_id: Uuid,
}

impl Ctx {
    pub fn new(result_user_id: AppResult<String>, req_id: Uuid) -> Self {
        Self {
            result_user_id,
            req_id,
        }
    }

    /// Context with no authenticated caller.
    pub fn anonymous() -> Self {
        Self::new(
            Err(AppError::AuthorizationFail {
                required: "authenticated user".to_string(),
            }),
            Uuid::new_v4(),
        )
    }

    pub fn user_id(&self) -> CtxResult<String> {
        self.result_user_id.clone().map_err(|error| CtxError {
            error,
            req_id: self.req_id,
        })
    }

    pub fn req_id(&self) -> Uuid {
        self.req_id
    }

    pub fn to_ctx_error(&self, error: AppError) -> CtxError {
        CtxError {
            error,
            req_id: self.req_id,
        }
    }
}
