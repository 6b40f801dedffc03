use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::info;
use uuid::Uuid;

use super::store::{DocumentStore, TxDecision, TxFn, TxOutcome};
use crate::config::AppConfig;
use crate::middleware::error::{AppError, AppResult};

pub type Db = Surreal<Any>;

pub const TABLE_NAME: &str = "document";

const MAX_TX_ATTEMPTS: usize = 10;

/// Document store backed by SurrealDB. Every path is one row in the
/// `document` table carrying the raw value and an opaque version token;
/// `transact` re-reads, recomputes and commits with a
/// `WHERE version = $expected` guard, retrying on conflict.
pub struct SurrealStore {
    db: Db,
}

#[derive(Debug, Deserialize)]
struct DocRow {
    data: Value,
    version: String,
}

#[derive(Debug, Deserialize)]
struct PathRow {
    path: String,
    data: Value,
}

impl SurrealStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Connects per the app configuration, selects namespace/database and
    /// ensures the `document` table exists. `mem://` gives an embedded
    /// in-process engine.
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        let conn = connect(config.db_url.as_str()).await?;
        if let (Some(username), Some(password)) =
            (config.db_username.as_deref(), config.db_password.as_deref())
        {
            conn.signin(Root { username, password }).await?;
        }
        conn.use_ns(config.db_namespace.as_str())
            .use_db(config.db_database.as_str())
            .await?;
        info!("->> connected document store at {}", config.db_url);
        let store = Self::new(conn);
        store.define_table().await?;
        Ok(store)
    }

    pub async fn define_table(&self) -> AppResult<()> {
        let sql = format!(
            "
    DEFINE TABLE IF NOT EXISTS {TABLE_NAME} SCHEMAFULL;
    DEFINE FIELD IF NOT EXISTS path ON TABLE {TABLE_NAME} TYPE string;
    DEFINE FIELD IF NOT EXISTS data ON TABLE {TABLE_NAME} FLEXIBLE TYPE object | array | string | number | bool;
    DEFINE FIELD IF NOT EXISTS version ON TABLE {TABLE_NAME} TYPE string;
    DEFINE INDEX IF NOT EXISTS path_idx ON TABLE {TABLE_NAME} COLUMNS path UNIQUE;
    "
        );
        let res = self.db.query(sql).await?;
        res.check()?;
        Ok(())
    }

    fn version_token() -> String {
        Uuid::new_v4().simple().to_string()
    }

    async fn read_row(&self, path: &str) -> AppResult<Option<DocRow>> {
        let mut res = self
            .db
            .query(format!(
                "SELECT data, version FROM ONLY type::thing('{TABLE_NAME}', $path);"
            ))
            .bind(("path", path.to_string()))
            .await?;
        Ok(res.take::<Option<DocRow>>(0)?)
    }

    async fn read_subtree(&self, path: &str) -> AppResult<Option<Value>> {
        let prefix = format!("{path}/");
        let mut res = self
            .db
            .query(format!(
                "SELECT path, data FROM {TABLE_NAME} WHERE string::starts_with(path, $prefix);"
            ))
            .bind(("prefix", prefix.clone()))
            .await?;
        let rows = res.take::<Vec<PathRow>>(0)?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut tree = Value::Object(Map::new());
        for row in rows {
            let rel = &row.path[prefix.len()..];
            let mut node = &mut tree;
            let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
            for seg in &segments[..segments.len().saturating_sub(1)] {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                node = node
                    .as_object_mut()
                    .unwrap()
                    .entry(seg.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            if let Some(last) = segments.last() {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                node.as_object_mut()
                    .unwrap()
                    .insert(last.to_string(), row.data);
            }
        }
        Ok(Some(tree))
    }

    async fn delete_path(&self, path: &str) -> AppResult<()> {
        let res = self
            .db
            .query(format!(
                "DELETE type::thing('{TABLE_NAME}', $path);
                 DELETE {TABLE_NAME} WHERE string::starts_with(path, $prefix);"
            ))
            .bind(("path", path.to_string()))
            .bind(("prefix", format!("{path}/")))
            .await?;
        res.check()?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SurrealStore {
    async fn get(&self, path: &str) -> AppResult<Option<Value>> {
        if let Some(row) = self.read_row(path).await? {
            return Ok(Some(row.data));
        }
        self.read_subtree(path).await
    }

    async fn set(&self, path: &str, value: Value) -> AppResult<()> {
        if value.is_null() {
            return self.delete_path(path).await;
        }
        let res = self
            .db
            .query(format!(
                "UPSERT type::thing('{TABLE_NAME}', $path) SET path = $path, data = $data, version = $version;"
            ))
            .bind(("path", path.to_string()))
            .bind(("data", value))
            .bind(("version", Self::version_token()))
            .await?;
        res.check()?;
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
        let outcome = self
            .transact(
                path,
                Box::new(move |current| {
                    let mut merged = current
                        .and_then(|v| v.as_object().cloned())
                        .unwrap_or_default();
                    for (key, value) in &fields {
                        if value.is_null() {
                            merged.remove(key);
                        } else {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                    TxDecision::Commit(Value::Object(merged))
                }),
            )
            .await?;
        debug_assert!(outcome.committed);
        Ok(())
    }

    async fn push(&self, _path: &str) -> AppResult<String> {
        Ok(Uuid::new_v4().simple().to_string())
    }

    async fn transact(&self, path: &str, mut f: TxFn<'_>) -> AppResult<TxOutcome> {
        for _ in 0..MAX_TX_ATTEMPTS {
            let row = self.read_row(path).await?;
            let current = row.as_ref().map(|r| r.data.clone());
            let next = match f(current.as_ref()) {
                TxDecision::Abort => return Ok(TxOutcome::aborted(current)),
                TxDecision::Commit(next) => next,
            };
            match row {
                Some(DocRow { version, .. }) => {
                    if next.is_null() {
                        let mut res = self
                            .db
                            .query(format!(
                                "DELETE type::thing('{TABLE_NAME}', $path) WHERE version = $expected RETURN BEFORE;"
                            ))
                            .bind(("path", path.to_string()))
                            .bind(("expected", version))
                            .await?;
                        let deleted = res.take::<Option<DocRow>>(0)?;
                        if deleted.is_some() || self.read_row(path).await?.is_none() {
                            return Ok(TxOutcome::committed(next));
                        }
                        continue;
                    }
                    let mut res = self
                        .db
                        .query(format!(
                            "UPDATE type::thing('{TABLE_NAME}', $path) SET data = $data, version = $version WHERE version = $expected RETURN AFTER;"
                        ))
                        .bind(("path", path.to_string()))
                        .bind(("data", next.clone()))
                        .bind(("version", Self::version_token()))
                        .bind(("expected", version))
                        .await?;
                    if res.take::<Option<DocRow>>(0)?.is_some() {
                        return Ok(TxOutcome::committed(next));
                    }
                }
                None => {
                    if next.is_null() {
                        return Ok(TxOutcome::committed(next));
                    }
                    let res = self
                        .db
                        .query(format!(
                            "CREATE type::thing('{TABLE_NAME}', $path) SET path = $path, data = $data, version = $version;"
                        ))
                        .bind(("path", path.to_string()))
                        .bind(("data", next.clone()))
                        .bind(("version", Self::version_token()))
                        .await?;
                    match res.check() {
                        Ok(_) => return Ok(TxOutcome::committed(next)),
                        // lost the create race, retry against the winner's value
                        Err(err) if err.to_string().contains("already exists") => {}
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
        Err(AppError::Store {
            source: format!("transaction on {path} exhausted {MAX_TX_ATTEMPTS} retries"),
        })
    }
}
