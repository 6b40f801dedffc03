use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::ctx::Ctx;

#[derive(Debug, PartialEq, Clone)]
pub struct CtxError {
    pub error: AppError,
    pub req_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AppError {
    Generic { description: String },
    AuthorizationFail { required: String },
    EntityFailIdNotFound { ident: String },
    Validation { source: String },
    DataIntegrity { ident: String, violations: Vec<String> },
    Store { source: String },
    Serde { source: String },
}

/// CtxError carries the req_id so callers can report it to the client.
pub type CtxResult<T> = core::result::Result<T, CtxError>;
/// Any error for storing before composing a response.
/// For errors that either don't affect the response, or are built before attaching the req_id.
pub type AppResult<T> = core::result::Result<T, AppError>;

impl std::error::Error for AppError {}

// for slightly less verbose error mappings
impl CtxError {
    pub fn from<T: Into<AppError>>(ctx: &Ctx) -> impl FnOnce(T) -> CtxError + '_ {
        |err| CtxError {
            req_id: ctx.req_id(),
            error: err.into(),
        }
    }
}

impl From<AppError> for CtxError {
    fn from(value: AppError) -> Self {
        CtxError {
            req_id: Uuid::new_v4(),
            error: value,
        }
    }
}

const INTERNAL: &str = "Internal error";

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic { description } => write!(f, "{description}"),
            Self::AuthorizationFail { required } => {
                write!(f, "not authorized - requires {required}")
            }
            Self::EntityFailIdNotFound { ident } => write!(f, "Record id= {ident} not found"),
            Self::Validation { source } => write!(f, "Validation error - {source}"),
            Self::DataIntegrity { ident, violations } => {
                write!(f, "Stored record {ident} is invalid: {}", violations.join(", "))
            }
            Self::Store { .. } => write!(f, "{INTERNAL}"),
            Self::Serde { source } => write!(f, "Serde error - {source}"),
        }
    }
}

impl fmt::Display for CtxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (req_id={})", self.error, self.req_id)
    }
}

// External Errors
impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde {
            source: value.to_string(),
        }
    }
}

impl From<surrealdb::Error> for AppError {
    fn from(value: surrealdb::Error) -> Self {
        Self::Store {
            source: value.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(value: validator::ValidationErrors) -> Self {
        Self::Validation {
            source: value.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for CtxError {
    fn from(value: validator::ValidationErrors) -> Self {
        CtxError {
            req_id: Uuid::new_v4(),
            error: value.into(),
        }
    }
}

impl From<CtxError> for AppError {
    fn from(value: CtxError) -> Self {
        value.error
    }
}
