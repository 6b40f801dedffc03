use async_trait::async_trait;
use serde_json::Value;

use crate::middleware::error::AppResult;

/// Decision returned by a transaction closure: commit the proposed value
/// or abort leaving the record untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum TxDecision {
    Commit(Value),
    Abort,
}

/// Result of a `transact` call. `value` is the committed value when
/// `committed` is true, otherwise the value the closure last observed.
#[derive(Clone, Debug, PartialEq)]
pub struct TxOutcome {
    pub committed: bool,
    pub value: Option<Value>,
}

impl TxOutcome {
    pub fn aborted(value: Option<Value>) -> Self {
        Self {
            committed: false,
            value,
        }
    }

    pub fn committed(value: Value) -> Self {
        Self {
            committed: true,
            value: Some(value),
        }
    }
}

/// Transaction closure over the current value at a path. May be invoked
/// more than once: the store re-runs it after a conflicting concurrent
/// write, always against the latest committed value.
pub type TxFn<'a> = Box<dyn FnMut(Option<&Value>) -> TxDecision + Send + 'a>;

/// Key-value document store over a tree of `/`-separated paths.
///
/// `transact` provides optimistic concurrency per path: the closure
/// computes the next value from the current one and the store commits it
/// only if no conflicting write landed in between, retrying internally
/// otherwise. There is no multi-path transaction; callers sequence
/// single-path transactions and compensate on partial failure.
///
/// `set(path, Value::Null)` removes the node at `path`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> AppResult<Option<Value>>;

    async fn set(&self, path: &str, value: Value) -> AppResult<()>;

    /// Merges the fields of `partial` (an object) into the object stored
    /// at `path`, creating it when absent.
    async fn update(&self, path: &str, partial: Value) -> AppResult<()>;

    /// Returns a fresh unique child key under `path`. Nothing is written.
    async fn push(&self, path: &str) -> AppResult<String>;

    async fn transact(&self, path: &str, f: TxFn<'_>) -> AppResult<TxOutcome>;
}

/// Canonical paths of the document tree.
pub mod paths {
    pub fn user(uid: &str) -> String {
        format!("users/{uid}")
    }

    pub fn wallet(uid: &str) -> String {
        format!("wallets/{uid}")
    }

    pub fn transactions(uid: &str) -> String {
        format!("transactions/{uid}")
    }

    pub fn transaction(uid: &str, push_id: &str) -> String {
        format!("transactions/{uid}/{push_id}")
    }

    pub fn campaign(campaign_id: &str) -> String {
        format!("campaigns/{campaign_id}")
    }

    pub fn works() -> String {
        "works".to_string()
    }

    pub fn works_of(uid: &str) -> String {
        format!("works/{uid}")
    }

    pub fn work(uid: &str, work_id: &str) -> String {
        format!("works/{uid}/{work_id}")
    }

    pub fn add_money_request(request_id: &str) -> String {
        format!("adminRequests/addMoney/{request_id}")
    }

    pub fn withdrawal_request(request_id: &str) -> String {
        format!("adminRequests/withdrawals/{request_id}")
    }
}
