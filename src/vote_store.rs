use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, TransactionTrait,
};
use tracing::{debug, info};

use crate::entities::vote;
use crate::error::{Result, VotingError};
use crate::result_store::ResultStore;
use crate::window::WindowPolicy;

/// Tag applied to a vote submitted without an explicit voting axis.
pub const DEFAULT_TAG: &str = "vote";

/// A vote as handed in by a caller, before normalization.
#[derive(Debug, Clone)]
pub struct VoteSubmission {
    pub target_type: String,
    pub target_id: i64,
    pub value: f64,
    pub value_type: String,
    /// Defaults to [`DEFAULT_TAG`] when absent.
    pub tag: Option<String>,
    /// 0 casts the vote anonymously.
    pub actor_id: i64,
    /// Client-identifying token used for anonymous dedup; ignored and
    /// cleared for identified actors.
    pub source: String,
}

/// Field-equality / IN / greater-than criteria for vote queries.
#[derive(Debug, Clone, Default)]
pub struct VoteCriteria {
    pub ids: Option<Vec<i64>>,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub tag: Option<String>,
    pub value_type: Option<String>,
    pub actor_id: Option<i64>,
    pub source: Option<String>,
    /// Strictly-greater bound, matching the watermark semantics.
    pub timestamp_after: Option<i64>,
}

/// A target entity that has received votes, as reported to deferred-schedule
/// drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotedTarget {
    pub target_type: String,
    pub target_id: i64,
}

/// CRUD and query surface over raw vote rows. Owns the vote lifecycle and
/// enforces the window policy at write time.
pub struct VoteStore {
    database: DatabaseConnection,
    policy: WindowPolicy,
}

impl VoteStore {
    pub fn new(database: DatabaseConnection, policy: WindowPolicy) -> Self {
        Self { database, policy }
    }

    /// Validates, normalizes and persists one vote.
    ///
    /// For positive rollover windows the insert replaces the actor's prior
    /// votes in the same (target, tag) scope whose timestamps fall inside
    /// the window: the replaced rows are deleted and the new row inserted in
    /// one transaction (the documented upsert strategy).
    pub async fn submit(&self, submission: VoteSubmission) -> Result<vote::Model> {
        let submission = validate_submission(submission)?;
        let tag = submission
            .tag
            .clone()
            .unwrap_or_else(|| DEFAULT_TAG.to_string());

        // Identified actors are deduplicated by actor id, never by source.
        let source = if submission.actor_id == 0 {
            submission.source.clone()
        } else {
            String::new()
        };

        let now = Utc::now().timestamp();
        let outcome = self
            .policy
            .effective_timestamp(submission.actor_id, &source, now);

        let txn = self.database.begin().await?;

        if let Some(replace_since) = outcome.replace_since {
            let mut rollover = vote::Entity::delete_many()
                .filter(vote::Column::TargetType.eq(submission.target_type.clone()))
                .filter(vote::Column::TargetId.eq(submission.target_id))
                .filter(vote::Column::Tag.eq(tag.clone()))
                .filter(vote::Column::Timestamp.gte(replace_since));
            rollover = if submission.actor_id != 0 {
                rollover.filter(vote::Column::ActorId.eq(submission.actor_id))
            } else {
                rollover
                    .filter(vote::Column::ActorId.eq(0))
                    .filter(vote::Column::Source.eq(source.clone()))
            };
            let replaced = rollover.exec(&txn).await?;
            if replaced.rows_affected > 0 {
                debug!(
                    "Rolled over {} prior vote(s) on {}/{} tag {tag}",
                    replaced.rows_affected, submission.target_type, submission.target_id
                );
            }
        }

        let model = vote::ActiveModel {
            target_type: Set(submission.target_type),
            target_id: Set(submission.target_id),
            value: Set(submission.value),
            value_type: Set(submission.value_type),
            tag: Set(tag),
            actor_id: Set(submission.actor_id),
            source: Set(source),
            timestamp: Set(outcome.timestamp),
            ..Default::default()
        };
        let saved = model.insert(&txn).await?;

        txn.commit().await?;
        Ok(saved)
    }

    pub async fn select(
        &self,
        criteria: &VoteCriteria,
        limit: Option<u64>,
    ) -> Result<Vec<vote::Model>> {
        let mut query = vote::Entity::find();

        if let Some(ids) = &criteria.ids {
            query = query.filter(vote::Column::Id.is_in(ids.iter().copied()));
        }
        if let Some(target_type) = &criteria.target_type {
            query = query.filter(vote::Column::TargetType.eq(target_type.clone()));
        }
        if let Some(target_id) = criteria.target_id {
            query = query.filter(vote::Column::TargetId.eq(target_id));
        }
        if let Some(tag) = &criteria.tag {
            query = query.filter(vote::Column::Tag.eq(tag.clone()));
        }
        if let Some(value_type) = &criteria.value_type {
            query = query.filter(vote::Column::ValueType.eq(value_type.clone()));
        }
        if let Some(actor_id) = criteria.actor_id {
            query = query.filter(vote::Column::ActorId.eq(actor_id));
        }
        if let Some(source) = &criteria.source {
            query = query.filter(vote::Column::Source.eq(source.clone()));
        }
        if let Some(timestamp) = criteria.timestamp_after {
            query = query.filter(vote::Column::Timestamp.gt(timestamp));
        }
        // A zero limit means "no limit", like an absent one.
        if let Some(limit) = limit {
            if limit > 0 {
                query = query.limit(limit);
            }
        }

        Ok(query.all(&self.database).await?)
    }

    /// Administrative bulk delete by vote id. Callers are responsible for
    /// recalculating the affected targets afterwards.
    pub async fn delete_votes(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = vote::Entity::delete_many()
            .filter(vote::Column::Id.is_in(ids.iter().copied()))
            .exec(&self.database)
            .await?;
        Ok(deleted.rows_affected)
    }

    /// Cascade entry point for deleted target entities: removes every vote
    /// and every cached result row for the target in one transaction.
    pub async fn delete_votes_for_target(&self, target_type: &str, target_id: i64) -> Result<()> {
        assert!(!target_type.is_empty(), "Target type cannot be empty");

        let txn = self.database.begin().await?;
        let votes = vote::Entity::delete_many()
            .filter(vote::Column::TargetType.eq(target_type.to_owned()))
            .filter(vote::Column::TargetId.eq(target_id))
            .exec(&txn)
            .await?;
        let results = ResultStore::clear_for_target(&txn, target_type, target_id).await?;
        txn.commit().await?;

        info!(
            "Deleted {} vote(s) and {results} result row(s) for {target_type}/{target_id}",
            votes.rows_affected
        );
        Ok(())
    }

    /// Distinct targets with votes newer than the watermark, for external
    /// deferred-schedule drivers.
    pub async fn targets_with_votes_since(&self, watermark: i64) -> Result<Vec<VotedTarget>> {
        let targets: Vec<(String, i64)> = vote::Entity::find()
            .select_only()
            .column(vote::Column::TargetType)
            .column(vote::Column::TargetId)
            .filter(vote::Column::Timestamp.gt(watermark))
            .group_by(vote::Column::TargetType)
            .group_by(vote::Column::TargetId)
            .into_tuple()
            .all(&self.database)
            .await?;

        Ok(targets
            .into_iter()
            .map(|(target_type, target_id)| VotedTarget {
                target_type,
                target_id,
            })
            .collect())
    }

    /// All current votes for one target, read inside the engine's replace
    /// transaction.
    pub(crate) async fn votes_for_target<C: ConnectionTrait>(
        conn: &C,
        target_type: &str,
        target_id: i64,
    ) -> Result<Vec<vote::Model>> {
        Ok(vote::Entity::find()
            .filter(vote::Column::TargetType.eq(target_type.to_owned()))
            .filter(vote::Column::TargetId.eq(target_id))
            .all(conn)
            .await?)
    }
}

fn validate_submission(submission: VoteSubmission) -> Result<VoteSubmission> {
    if submission.target_type.trim().is_empty() {
        return Err(VotingError::Validation(
            "target_type must not be empty".to_string(),
        ));
    }
    if submission.target_id <= 0 {
        return Err(VotingError::Validation(
            "target_id must be a positive entity identifier".to_string(),
        ));
    }
    if submission.value_type.trim().is_empty() {
        return Err(VotingError::Validation(
            "value_type must not be empty".to_string(),
        ));
    }
    if !submission.value.is_finite() {
        return Err(VotingError::Validation(
            "value must be a finite number".to_string(),
        ));
    }
    if let Some(tag) = &submission.tag {
        if tag.trim().is_empty() {
            return Err(VotingError::Validation(
                "tag must not be empty when supplied".to_string(),
            ));
        }
    }
    if submission.actor_id < 0 {
        return Err(VotingError::Validation(
            "actor_id must be 0 (anonymous) or a positive actor identifier".to_string(),
        ));
    }
    Ok(submission)
}
