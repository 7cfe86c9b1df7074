use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{debug, info};

use crate::aggregation::{FunctionRegistry, ResultSet, compute_builtin_results, group_votes};
use crate::config::CalculationSchedule;
use crate::entities::vote_result;
use crate::error::Result;
use crate::result_store::ResultStore;
use crate::vote_store::VoteStore;

/// Invoked with the computed working set before persistence; may add,
/// override or remove functions.
pub type AlterHook = Box<dyn Fn(&mut ResultSet, &str, i64) + Send + Sync>;

/// Invoked with the final persisted result rows after the replace commits.
/// Fire-and-forget; the engine consumes no return value.
pub type ResultsHook = Box<dyn Fn(&[vote_result::Model], &str, i64) + Send + Sync>;

/// Turns raw votes into cached aggregate rows by destructive replace.
///
/// The engine is the only writer of the results table. The delete and the
/// insert happen inside one transaction, so a concurrent reader sees either
/// the old complete set or the new complete set.
pub struct ResultEngine {
    database: DatabaseConnection,
    registry: Arc<FunctionRegistry>,
    schedule: CalculationSchedule,
    alter_hooks: Vec<AlterHook>,
    results_hooks: Vec<ResultsHook>,
    target_locks: Mutex<HashMap<(String, i64), Arc<tokio::sync::Mutex<()>>>>,
}

impl ResultEngine {
    pub fn new(
        database: DatabaseConnection,
        schedule: CalculationSchedule,
        registry: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            database,
            registry,
            schedule,
            alter_hooks: Vec::new(),
            results_hooks: Vec::new(),
            target_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Hooks must be registered before the engine is shared; registration
    /// order is invocation order.
    pub fn add_alter_hook(&mut self, hook: AlterHook) {
        self.alter_hooks.push(hook);
    }

    pub fn add_results_hook(&mut self, hook: ResultsHook) {
        self.results_hooks.push(hook);
    }

    pub fn schedule(&self) -> CalculationSchedule {
        self.schedule
    }

    /// Recalculates the cached results for one target.
    ///
    /// Under the deferred schedule an unforced call is a no-op; the external
    /// periodic driver is expected to force recalculation per target instead.
    /// Zero votes yield zero results and clear the cache for the target.
    pub async fn recalculate(
        &self,
        target_type: &str,
        target_id: i64,
        force_calculation: bool,
    ) -> Result<Vec<vote_result::Model>> {
        assert!(!target_type.is_empty(), "Target type cannot be empty");

        if self.schedule == CalculationSchedule::Deferred && !force_calculation {
            debug!("Deferred schedule, skipping recalculation for {target_type}/{target_id}");
            return Ok(Vec::new());
        }

        // Concurrent recalculations of the same target would interleave
        // delete/insert pairs; serialize them per target.
        let lock = self.target_lock(target_type, target_id);
        let guard = lock.lock().await;
        let outcome = self.replace_results(target_type, target_id).await;
        drop(guard);
        self.evict_target_lock(target_type, target_id, lock);

        let (saved, cleared) = outcome?;

        info!(
            "Recalculated {target_type}/{target_id}: {} result rows replace {cleared}",
            saved.len()
        );

        for hook in &self.results_hooks {
            hook(&saved, target_type, target_id);
        }

        Ok(saved)
    }

    /// The transactional replace itself: a concurrent reader sees either the
    /// prior complete set or the new complete set.
    async fn replace_results(
        &self,
        target_type: &str,
        target_id: i64,
    ) -> Result<(Vec<vote_result::Model>, u64)> {
        let txn = self.database.begin().await?;

        let cleared = ResultStore::clear_for_target(&txn, target_type, target_id).await?;
        let votes = VoteStore::votes_for_target(&txn, target_type, target_id).await?;

        let groups = group_votes(&votes);
        let mut working = compute_builtin_results(&groups);
        self.registry.apply(&mut working, &groups);
        for hook in &self.alter_hooks {
            hook(&mut working, target_type, target_id);
        }

        let saved = if working.is_empty() {
            Vec::new()
        } else {
            let calculated_at = Utc::now().timestamp();
            let rows = flatten_results(&working, target_type, target_id, calculated_at);
            ResultStore::insert_batch(&txn, rows).await?;
            ResultStore::read_for_target(&txn, target_type, target_id).await?
        };

        txn.commit().await?;
        Ok((saved, cleared))
    }

    fn target_lock(&self, target_type: &str, target_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .target_locks
            .lock()
            .expect("Target lock registry poisoned");
        locks
            .entry((target_type.to_string(), target_id))
            .or_default()
            .clone()
    }

    /// Drops the registry entry once no other task holds the lock, so the
    /// registry does not accumulate one entry per target ever voted on.
    fn evict_target_lock(
        &self,
        target_type: &str,
        target_id: i64,
        lock: Arc<tokio::sync::Mutex<()>>,
    ) {
        drop(lock);
        let mut locks = self
            .target_locks
            .lock()
            .expect("Target lock registry poisoned");
        let key = (target_type.to_string(), target_id);
        if let Some(entry) = locks.get(&key) {
            if Arc::strong_count(entry) == 1 {
                locks.remove(&key);
            }
        }
    }
}

fn flatten_results(
    working: &ResultSet,
    target_type: &str,
    target_id: i64,
    calculated_at: i64,
) -> Vec<vote_result::ActiveModel> {
    working
        .iter()
        .map(|(tag, value_type, function, value)| vote_result::ActiveModel {
            target_type: Set(target_type.to_string()),
            target_id: Set(target_id),
            value: Set(value),
            value_type: Set(value_type.to_string()),
            tag: Set(tag.to_string()),
            function: Set(function.to_string()),
            timestamp: Set(calculated_at),
            ..Default::default()
        })
        .collect()
}
