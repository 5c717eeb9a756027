use sqlx::{sqlite::SqliteRow, Row};

use agentforge_core::domain::agent::AgentId;
use agentforge_core::domain::execution::{
    Execution, ExecutionId, ExecutionSource, ExecutionStatus,
};
use agentforge_core::domain::workflow::WorkflowId;

use super::rows::{decode_json, encode_json, parse_optional_timestamp, parse_timestamp, parse_u64};
use super::{ExecutionRepository, RepositoryError};
use crate::DbPool;

const EXECUTION_COLUMNS: &str = "id, workflow_id, agent_id, source, trigger_event,
    trigger_data_json, status, steps_completed_json, error_message, started_at, completed_at,
    execution_time_ms";

pub struct SqlExecutionRepository {
    pool: DbPool,
}

impl SqlExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ExecutionRepository for SqlExecutionRepository {
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {EXECUTION_COLUMNS} FROM agent_execution WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(execution_from_row).transpose()
    }

    async fn list_for_workflow(
        &self,
        workflow_id: &WorkflowId,
        limit: u32,
    ) -> Result<Vec<Execution>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM agent_execution
             WHERE workflow_id = ?
             ORDER BY started_at DESC
             LIMIT ?"
        ))
        .bind(&workflow_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(execution_from_row).collect()
    }

    async fn insert(&self, execution: Execution) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent_execution (
                id, workflow_id, agent_id, source, trigger_event, trigger_data_json, status,
                steps_completed_json, error_message, started_at, completed_at, execution_time_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&execution.id.0)
        .bind(execution.workflow_id.as_ref().map(|id| id.0.as_str()))
        .bind(execution.agent_id.as_ref().map(|id| id.0.as_str()))
        .bind(execution.source.as_str())
        .bind(&execution.trigger_event)
        .bind(encode_json("trigger_data_json", &execution.trigger_data)?)
        .bind(execution.status.as_str())
        .bind(encode_json("steps_completed_json", &execution.steps_completed)?)
        .bind(&execution.error_message)
        .bind(execution.started_at.to_rfc3339())
        .bind(execution.completed_at.map(|at| at.to_rfc3339()))
        .bind(execution.execution_time_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_guarded(&self, execution: &Execution) -> Result<bool, RepositoryError> {
        let allowed = execution.status.predecessors();
        if allowed.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!(
            "UPDATE agent_execution SET
                status = ?,
                steps_completed_json = ?,
                error_message = ?,
                completed_at = ?,
                execution_time_ms = ?
             WHERE id = ? AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(execution.status.as_str())
            .bind(encode_json("steps_completed_json", &execution.steps_completed)?)
            .bind(&execution.error_message)
            .bind(execution.completed_at.map(|at| at.to_rfc3339()))
            .bind(execution.execution_time_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)))
            .bind(&execution.id.0);
        for status in allowed {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

fn execution_from_row(row: SqliteRow) -> Result<Execution, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ExecutionStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown execution status `{status_raw}`"))
    })?;
    let source_raw = row.try_get::<String, _>("source")?;
    let source = ExecutionSource::parse(&source_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown execution source `{source_raw}`"))
    })?;
    let trigger_data: String = row.try_get("trigger_data_json")?;
    let steps: String = row.try_get("steps_completed_json")?;

    Ok(Execution {
        id: ExecutionId(row.try_get("id")?),
        workflow_id: row.try_get::<Option<String>, _>("workflow_id")?.map(WorkflowId),
        agent_id: row.try_get::<Option<String>, _>("agent_id")?.map(AgentId),
        source,
        trigger_event: row.try_get("trigger_event")?,
        trigger_data: decode_json("trigger_data_json", &trigger_data)?,
        status,
        steps_completed: decode_json("steps_completed_json", &steps)?,
        error_message: row.try_get("error_message")?,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        execution_time_ms: row
            .try_get::<Option<i64>, _>("execution_time_ms")?
            .map(|ms| parse_u64("execution_time_ms", ms))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use agentforge_core::domain::execution::{
        Execution, ExecutionId, ExecutionSource, ExecutionStatus, StepStatus, StepTrace,
    };
    use agentforge_core::domain::workflow::{StepKind, WorkflowDraft, WorkflowId};

    use super::SqlExecutionRepository;
    use crate::migrations;
    use crate::repositories::{ExecutionRepository, SqlWorkflowRepository, WorkflowRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn guarded_update_follows_the_status_machine() {
        let pool = setup_pool().await;
        let workflow_id = insert_workflow(&pool).await;
        let repo = SqlExecutionRepository::new(pool.clone());

        let mut execution = Execution::pending(
            ExecutionId("exec-1".to_string()),
            Some(workflow_id.clone()),
            ExecutionSource::Workflow,
            "order_created",
            json!({"amount": 250}),
            parse_ts("2026-03-01T08:00:00Z"),
        );
        repo.insert(execution.clone()).await.expect("insert pending");

        execution.start().expect("start");
        assert!(repo.update_guarded(&execution).await.expect("claim"));

        execution
            .record_step(StepTrace {
                step: 1,
                node_type: StepKind::Condition,
                label: "large order".to_string(),
                status: StepStatus::Completed,
                duration_ms: 1,
                error: None,
                result: Some(json!({"result": true})),
                completed_at: parse_ts("2026-03-01T08:00:01Z"),
            })
            .expect("record step");
        assert!(repo.update_guarded(&execution).await.expect("append trace"));

        execution.complete(parse_ts("2026-03-01T08:00:02Z")).expect("complete");
        assert!(repo.update_guarded(&execution).await.expect("complete"));

        let mut stale = execution.clone();
        stale.status = ExecutionStatus::Running;
        stale.steps_completed.clear();
        assert!(!repo.update_guarded(&stale).await.expect("terminal row untouched"));

        let stored = repo.find_by_id(&execution.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert_eq!(stored.steps_completed.len(), 1);
        assert_eq!(stored.execution_time_ms, Some(2000));
        assert_eq!(stored, execution);

        let listed = repo.list_for_workflow(&workflow_id, 10).await.expect("list");
        assert_eq!(listed, vec![execution]);

        pool.close().await;
    }

    #[tokio::test]
    async fn pending_row_cannot_jump_to_completed() {
        let pool = setup_pool().await;
        let repo = SqlExecutionRepository::new(pool.clone());

        let execution = Execution::pending(
            ExecutionId("exec-2".to_string()),
            None,
            ExecutionSource::ToolTest,
            "tool_test",
            json!({}),
            parse_ts("2026-03-01T08:00:00Z"),
        );
        repo.insert(execution.clone()).await.expect("insert pending");

        let mut skipped = execution.clone();
        skipped.status = ExecutionStatus::Completed;
        assert!(!repo.update_guarded(&skipped).await.expect("guarded"));
        assert!(!repo.update_guarded(&execution).await.expect("pending never rewritten"));

        let stored = repo.find_by_id(&execution.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ExecutionStatus::Pending);

        pool.close().await;
    }

    async fn insert_workflow(pool: &DbPool) -> WorkflowId {
        let workflow = WorkflowDraft {
            name: "Large order review".to_string(),
            trigger_event: "order_created".to_string(),
            ..WorkflowDraft::default()
        }
        .into_workflow(WorkflowId("wf-1".to_string()), parse_ts("2026-03-01T07:00:00Z"));
        SqlWorkflowRepository::new(pool.clone()).save(workflow.clone()).await.expect("save workflow");
        workflow.id
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
