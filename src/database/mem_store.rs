use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::store::{DocumentStore, TxDecision, TxFn, TxOutcome};
use crate::middleware::error::{AppError, AppResult};

/// In-memory document tree. The whole tree lives behind one lock and a
/// transaction closure runs while the lock is held, so a conflicting
/// write cannot interleave between read and commit; the commit-only-if-
/// unconflicted contract of [`DocumentStore::transact`] holds trivially
/// and the closure is invoked exactly once.
///
/// Used by tests and embedded callers.
#[derive(Default)]
pub struct MemStore {
    root: Mutex<Value>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
        }
    }

    fn segments(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    fn node_at<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
        let mut node = root;
        for seg in Self::segments(path) {
            node = node.as_object()?.get(seg)?;
        }
        Some(node)
    }

    fn write_at(root: &mut Value, path: &str, value: Value) {
        let segments = Self::segments(path);
        if segments.is_empty() {
            *root = value;
            return;
        }
        let mut node = root;
        for seg in &segments[..segments.len() - 1] {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = node
                .as_object_mut()
                .unwrap()
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let last = segments[segments.len() - 1];
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let map = node.as_object_mut().unwrap();
        if value.is_null() {
            map.remove(last);
        } else {
            map.insert(last.to_string(), value);
        }
    }
}

#[async_trait]
impl DocumentStore for MemStore {
    async fn get(&self, path: &str) -> AppResult<Option<Value>> {
        let root = self.root.lock().map_err(|_| AppError::Store {
            source: "store lock poisoned".to_string(),
        })?;
        Ok(Self::node_at(&root, path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> AppResult<()> {
        let mut root = self.root.lock().map_err(|_| AppError::Store {
            source: "store lock poisoned".to_string(),
        })?;
        Self::write_at(&mut root, path, value);
        Ok(())
    }

    async fn update(&self, path: &str, partial: Value) -> AppResult<()> {
        let fields = match partial {
            Value::Object(map) => map,
            other => {
                return Err(AppError::Store {
                    source: format!("update expects an object, got {other}"),
                })
            }
        };
        let mut root = self.root.lock().map_err(|_| AppError::Store {
            source: "store lock poisoned".to_string(),
        })?;
        let mut current = Self::node_at(&root, path)
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        for (key, value) in fields {
            if value.is_null() {
                current.remove(&key);
            } else {
                current.insert(key, value);
            }
        }
        Self::write_at(&mut root, path, Value::Object(current));
        Ok(())
    }

    async fn push(&self, _path: &str) -> AppResult<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }

    async fn transact(&self, path: &str, mut f: TxFn<'_>) -> AppResult<TxOutcome> {
        let mut root = self.root.lock().map_err(|_| AppError::Store {
            source: "store lock poisoned".to_string(),
        })?;
        let current = Self::node_at(&root, path).cloned();
        match f(current.as_ref()) {
            TxDecision::Abort => Ok(TxOutcome::aborted(current)),
            TxDecision::Commit(next) => {
                Self::write_at(&mut root, path, next.clone());
                Ok(TxOutcome::committed(next))
            }
        }
    }
}
