use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::database::read_cache::{keys, ReadCache};
use crate::database::store::{paths, DocumentStore};
use crate::entities::campaign::work_entity::{Work, WorkStatus};
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{CtxError, CtxResult};

/// Tolerated clock drift on `submittedAt` timestamps.
const FUTURE_DRIFT_MS: i64 = 60_000;

const MAX_ENTRIES: usize = 50;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaderboardPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl LeaderboardPeriod {
    fn window_ms(&self) -> i64 {
        const HOUR: i64 = 60 * 60 * 1000;
        match self {
            LeaderboardPeriod::Daily => 24 * HOUR,
            LeaderboardPeriod::Weekly => 7 * 24 * HOUR,
            LeaderboardPeriod::Monthly => 30 * 24 * HOUR,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub user_name: String,
    pub approved_works: u32,
    pub earned_money: f64,
}

/// Read-only aggregation over all work items: approved submissions in a
/// rolling window, grouped by user, top 50. Results are cached per
/// period and concurrent misses share one underlying scan.
pub struct LeaderboardService<'a, S: DocumentStore> {
    store: &'a S,
    cache: &'a ReadCache,
    ctx: &'a Ctx,
}

impl<'a, S: DocumentStore> LeaderboardService<'a, S> {
    pub fn new(store: &'a S, cache: &'a ReadCache, ctx: &'a Ctx) -> Self {
        Self { store, cache, ctx }
    }

    pub async fn fetch(&self, period: LeaderboardPeriod) -> CtxResult<Vec<LeaderboardEntry>> {
        let key = keys::leaderboard(&period.to_string());
        let store = self.store;
        let value = self
            .cache
            .get_or_fetch(&key, async move {
                let tree = store.get(&paths::works()).await?.unwrap_or(Value::Null);
                let entries = build_entries(&tree, period);
                Ok(serde_json::to_value(entries)?)
            })
            .await
            .map_err(CtxError::from(self.ctx))?;
        serde_json::from_value(value).map_err(|e| self.ctx.to_ctx_error(e.into()))
    }
}

fn build_entries(tree: &Value, period: LeaderboardPeriod) -> Vec<LeaderboardEntry> {
    let now = Utc::now().timestamp_millis();
    let min_submitted = now - period.window_ms();
    let max_submitted = now + FUTURE_DRIFT_MS;

    struct UserTotals {
        user_name: String,
        approved_works: u32,
        earned_money: f64,
    }

    let mut totals: HashMap<String, UserTotals> = HashMap::new();
    let Some(users) = tree.as_object() else {
        return Vec::new();
    };
    for (uid, works) in users {
        let Some(works) = works.as_object() else {
            continue;
        };
        for work in works.values() {
            // malformed items are skipped, this is a read-only view
            let Ok(work) = serde_json::from_value::<Work>(work.clone()) else {
                continue;
            };
            if work.status != WorkStatus::Approved
                || work.submitted_at < min_submitted
                || work.submitted_at > max_submitted
            {
                continue;
            }
            let entry = totals.entry(uid.clone()).or_insert_with(|| UserTotals {
                user_name: work.user_name.clone(),
                approved_works: 0,
                earned_money: 0.0,
            });
            entry.approved_works += 1;
            entry.earned_money += work.reward;
        }
    }

    let mut entries: Vec<LeaderboardEntry> = totals
        .into_iter()
        .map(|(user_id, totals)| LeaderboardEntry {
            rank: 0,
            user_id,
            user_name: totals.user_name,
            approved_works: totals.approved_works,
            earned_money: totals.earned_money,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.approved_works.cmp(&a.approved_works).then(
            b.earned_money
                .partial_cmp(&a.earned_money)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    entries.truncate(MAX_ENTRIES);
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.rank = index as u32 + 1;
    }
    entries
}
