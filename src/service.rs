use std::sync::Arc;
use std::time::Duration;

use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::aggregation::{FunctionRegistry, ResultSet};
use crate::config::{CalculationSchedule, VotingConfig, VotingSettings};
use crate::engine::ResultEngine;
use crate::entities::{vote, vote_result};
use crate::error::Result;
use crate::result_store::ResultStore;
use crate::vote_store::{VoteCriteria, VoteStore, VoteSubmission, VotedTarget};

/// Facade wiring the vote store, result store and recalculation engine into
/// the core API surface consumers call.
pub struct VotingService {
    schedule: CalculationSchedule,
    votes: VoteStore,
    results: ResultStore,
    engine: Arc<ResultEngine>,
}

impl VotingService {
    /// Wires the service around an already-configured engine, so callers can
    /// register aggregation functions and hooks before handing it over.
    pub fn new(
        database: DatabaseConnection,
        settings: &VotingSettings,
        engine: ResultEngine,
    ) -> Result<Self> {
        assert_eq!(
            engine.schedule(),
            settings.calculation_schedule,
            "Engine schedule must match the configured schedule"
        );
        let policy = settings.window_policy()?;
        Ok(Self {
            schedule: settings.calculation_schedule,
            votes: VoteStore::new(database.clone(), policy),
            results: ResultStore::new(database),
            engine: Arc::new(engine),
        })
    }

    /// Convenience constructor for callers without hooks to register.
    pub fn with_registry(
        database: DatabaseConnection,
        settings: &VotingSettings,
        registry: Arc<FunctionRegistry>,
    ) -> Result<Self> {
        let engine = ResultEngine::new(
            database.clone(),
            settings.calculation_schedule,
            registry,
        );
        Self::new(database, settings, engine)
    }

    /// Connects to the backing store and brings the schema up to date.
    pub async fn connect(config: &VotingConfig) -> Result<DatabaseConnection> {
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .sqlx_logging(true)
            .acquire_timeout(Duration::from_secs(10));

        if let Some(min) = config.database.min_connections {
            options.min_connections(min);
        }

        let database = Database::connect(options).await?;
        migration::Migrator::up(&database, None).await?;
        info!("Vote storage schema is up to date");
        Ok(database)
    }

    /// Validates and persists one vote, then retallies the target when the
    /// schedule is immediate. Deferred and manual schedules leave the cached
    /// results untouched here.
    pub async fn submit_vote(&self, submission: VoteSubmission) -> Result<vote::Model> {
        let saved = self.votes.submit(submission).await?;
        if self.schedule == CalculationSchedule::Immediate {
            self.engine
                .recalculate(&saved.target_type, saved.target_id, false)
                .await?;
        }
        Ok(saved)
    }

    pub async fn recalculate(
        &self,
        target_type: &str,
        target_id: i64,
        force_calculation: bool,
    ) -> Result<Vec<vote_result::Model>> {
        self.engine
            .recalculate(target_type, target_id, force_calculation)
            .await
    }

    /// Read-only consumer view: tag -> value type -> function -> value.
    pub async fn get_results(&self, target_type: &str, target_id: i64) -> Result<ResultSet> {
        self.results.get_results(target_type, target_id).await
    }

    pub async fn get_entity_results(
        &self,
        target_type: &str,
        target_id: i64,
        tags: &[String],
        function: Option<&str>,
    ) -> Result<Vec<vote_result::Model>> {
        self.results
            .get_entity_results(target_type, target_id, tags, function)
            .await
    }

    pub async fn select_votes(
        &self,
        criteria: &VoteCriteria,
        limit: Option<u64>,
    ) -> Result<Vec<vote::Model>> {
        self.votes.select(criteria, limit).await
    }

    pub async fn delete_votes(&self, ids: &[i64]) -> Result<u64> {
        self.votes.delete_votes(ids).await
    }

    /// Cascade hook consumers invoke when the voted-upon entity is removed.
    pub async fn on_target_deleted(&self, target_type: &str, target_id: i64) -> Result<()> {
        self.votes
            .delete_votes_for_target(target_type, target_id)
            .await
    }

    /// Deferred-schedule drivers iterate these targets and force a
    /// recalculation for each, then advance their own watermark.
    pub async fn targets_with_votes_since(&self, watermark: i64) -> Result<Vec<VotedTarget>> {
        self.votes.targets_with_votes_since(watermark).await
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;
    use crate::aggregation::VALUE_TYPE_POINTS;

    fn settings(schedule: CalculationSchedule) -> VotingSettings {
        VotingSettings {
            anonymous_window: 86_400,
            user_window: -1,
            calculation_schedule: schedule,
        }
    }

    fn submission() -> VoteSubmission {
        VoteSubmission {
            target_type: "node".to_string(),
            target_id: 42,
            value: 10.0,
            value_type: VALUE_TYPE_POINTS.to_string(),
            tag: None,
            actor_id: 7,
            source: String::new(),
        }
    }

    fn saved_vote() -> vote::Model {
        vote::Model {
            id: 1,
            target_type: "node".to_string(),
            target_id: 42,
            value: 10.0,
            value_type: VALUE_TYPE_POINTS.to_string(),
            tag: "vote".to_string(),
            actor_id: 7,
            source: String::new(),
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn manual_schedule_persists_without_retallying() {
        let database = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![saved_vote()]])
            .into_connection();
        let service = VotingService::with_registry(
            database.clone(),
            &settings(CalculationSchedule::Manual),
            Arc::new(FunctionRegistry::new()),
        )
        .unwrap();

        let saved = service.submit_vote(submission()).await.unwrap();

        assert_eq!(saved.tag, "vote");
        assert_eq!(saved.timestamp, 1_700_000_000);
        // One transaction: the vote insert. No recalculation follows.
        assert_eq!(database.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn immediate_schedule_retallies_after_the_vote() {
        let database = MockDatabase::new(DatabaseBackend::Postgres)
            // vote insert
            .append_query_results([vec![saved_vote()]])
            // recalculation: clear, then batch insert
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                MockExecResult {
                    last_insert_id: 2,
                    rows_affected: 2,
                },
            ])
            // recalculation: current votes for the target
            .append_query_results([vec![saved_vote()]])
            // recalculation: read-back of the replaced rows
            .append_query_results([vec![
                vote_result::Model {
                    id: 1,
                    target_type: "node".to_string(),
                    target_id: 42,
                    value: 10.0,
                    value_type: VALUE_TYPE_POINTS.to_string(),
                    tag: "vote".to_string(),
                    function: "average".to_string(),
                    timestamp: 1_700_000_100,
                },
                vote_result::Model {
                    id: 2,
                    target_type: "node".to_string(),
                    target_id: 42,
                    value: 1.0,
                    value_type: VALUE_TYPE_POINTS.to_string(),
                    tag: "vote".to_string(),
                    function: "count".to_string(),
                    timestamp: 1_700_000_100,
                },
            ]])
            .into_connection();
        let service = VotingService::with_registry(
            database.clone(),
            &settings(CalculationSchedule::Immediate),
            Arc::new(FunctionRegistry::new()),
        )
        .unwrap();

        service.submit_vote(submission()).await.unwrap();

        // Vote insert transaction plus the replace transaction.
        assert_eq!(database.into_transaction_log().len(), 2);
    }

    #[tokio::test]
    async fn deferred_recalculate_without_force_does_nothing() {
        let database = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = VotingService::with_registry(
            database.clone(),
            &settings(CalculationSchedule::Deferred),
            Arc::new(FunctionRegistry::new()),
        )
        .unwrap();

        let results = service.recalculate("node", 42, false).await.unwrap();

        assert!(results.is_empty());
        assert!(database.into_transaction_log().is_empty());
    }
}
