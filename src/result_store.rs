use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

use crate::aggregation::ResultSet;
use crate::entities::vote_result;
use crate::error::Result;

/// Read surface over cached result rows. The recalculation engine is the
/// only writer; the crate-internal helpers below exist for its replace
/// transaction and for the vote store's deletion cascade.
pub struct ResultStore {
    database: DatabaseConnection,
}

impl ResultStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Result rows for a target, optionally restricted to a tag set and a
    /// single function, sorted by tag.
    pub async fn get_entity_results(
        &self,
        target_type: &str,
        target_id: i64,
        tags: &[String],
        function: Option<&str>,
    ) -> Result<Vec<vote_result::Model>> {
        let mut query = vote_result::Entity::find()
            .filter(vote_result::Column::TargetType.eq(target_type.to_owned()))
            .filter(vote_result::Column::TargetId.eq(target_id));

        if !tags.is_empty() {
            query = query.filter(vote_result::Column::Tag.is_in(tags.iter().cloned()));
        }
        if let Some(function) = function {
            query = query.filter(vote_result::Column::Function.eq(function.to_owned()));
        }

        Ok(query
            .order_by_asc(vote_result::Column::Tag)
            .all(&self.database)
            .await?)
    }

    /// Read-only consumer view: tag -> value type -> function -> value.
    pub async fn get_results(&self, target_type: &str, target_id: i64) -> Result<ResultSet> {
        let rows = vote_result::Entity::find()
            .filter(vote_result::Column::TargetType.eq(target_type.to_owned()))
            .filter(vote_result::Column::TargetId.eq(target_id))
            .all(&self.database)
            .await?;

        let mut view = ResultSet::new();
        for row in rows {
            view.set(&row.tag, &row.value_type, &row.function, row.value);
        }
        Ok(view)
    }

    pub(crate) async fn clear_for_target<C: ConnectionTrait>(
        conn: &C,
        target_type: &str,
        target_id: i64,
    ) -> Result<u64> {
        let deleted = vote_result::Entity::delete_many()
            .filter(vote_result::Column::TargetType.eq(target_type.to_owned()))
            .filter(vote_result::Column::TargetId.eq(target_id))
            .exec(conn)
            .await?;
        Ok(deleted.rows_affected)
    }

    pub(crate) async fn insert_batch<C: ConnectionTrait>(
        conn: &C,
        rows: Vec<vote_result::ActiveModel>,
    ) -> Result<()> {
        assert!(!rows.is_empty(), "Result batch cannot be empty");
        vote_result::Entity::insert_many(rows)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn read_for_target<C: ConnectionTrait>(
        conn: &C,
        target_type: &str,
        target_id: i64,
    ) -> Result<Vec<vote_result::Model>> {
        Ok(vote_result::Entity::find()
            .filter(vote_result::Column::TargetType.eq(target_type.to_owned()))
            .filter(vote_result::Column::TargetId.eq(target_id))
            .order_by_asc(vote_result::Column::Tag)
            .all(conn)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase};

    use super::*;
    use crate::aggregation::{FUNCTION_AVERAGE, FUNCTION_SUM, VALUE_TYPE_POINTS};

    fn row(id: i64, tag: &str, function: &str, value: f64) -> vote_result::Model {
        vote_result::Model {
            id,
            target_type: "node".to_string(),
            target_id: 42,
            value,
            value_type: VALUE_TYPE_POINTS.to_string(),
            tag: tag.to_string(),
            function: function.to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn consumer_view_is_keyed_by_tag_type_function() {
        let database = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                row(1, "test", FUNCTION_SUM, 90.0),
                row(2, "test", FUNCTION_AVERAGE, 30.0),
                row(3, "funny", FUNCTION_SUM, 5.0),
            ]])
            .into_connection();
        let store = ResultStore::new(database);

        let view = store.get_results("node", 42).await.unwrap();

        assert_eq!(view.get("test", VALUE_TYPE_POINTS, FUNCTION_SUM), Some(90.0));
        assert_eq!(
            view.get("test", VALUE_TYPE_POINTS, FUNCTION_AVERAGE),
            Some(30.0)
        );
        assert_eq!(view.get("funny", VALUE_TYPE_POINTS, FUNCTION_SUM), Some(5.0));
        assert_eq!(view.len(), 3);
    }

    #[tokio::test]
    async fn empty_cache_yields_an_empty_view() {
        let database = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<vote_result::Model>::new()])
            .into_connection();
        let store = ResultStore::new(database);

        let view = store.get_results("node", 7).await.unwrap();

        assert!(view.is_empty());
    }
}
