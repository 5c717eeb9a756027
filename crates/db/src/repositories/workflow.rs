use sqlx::{sqlite::SqliteRow, Row};

use agentforge_core::domain::workflow::{Workflow, WorkflowId};

use super::rows::{decode_json, encode_json, parse_timestamp, parse_u32};
use super::{RepositoryError, WorkflowRepository};
use crate::DbPool;

const WORKFLOW_COLUMNS: &str = "id, name, description, trigger_event, steps_json, is_active,
    version, created_by, created_at, updated_at";

pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WorkflowRepository for SqlWorkflowRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {WORKFLOW_COLUMNS} FROM agent_workflow WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(workflow_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM agent_workflow ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(workflow_from_row).collect()
    }

    async fn list_active_by_trigger(
        &self,
        trigger_event: &str,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM agent_workflow
             WHERE trigger_event = ? AND is_active = 1
             ORDER BY created_at ASC"
        ))
        .bind(trigger_event)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(workflow_from_row).collect()
    }

    async fn save(&self, workflow: Workflow) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent_workflow (
                id, name, description, trigger_event, steps_json, is_active, version,
                created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                trigger_event = excluded.trigger_event,
                steps_json = excluded.steps_json,
                is_active = excluded.is_active,
                version = excluded.version,
                updated_at = excluded.updated_at",
        )
        .bind(&workflow.id.0)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(&workflow.trigger_event)
        .bind(encode_json("steps_json", &workflow.steps)?)
        .bind(workflow.is_active)
        .bind(i64::from(workflow.version))
        .bind(&workflow.created_by)
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM agent_workflow WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn workflow_from_row(row: SqliteRow) -> Result<Workflow, RepositoryError> {
    let steps: String = row.try_get("steps_json")?;

    Ok(Workflow {
        id: WorkflowId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        trigger_event: row.try_get("trigger_event")?,
        steps: decode_json("steps_json", &steps)?,
        is_active: row.try_get("is_active")?,
        version: parse_u32("version", row.try_get("version")?)?,
        created_by: row.try_get("created_by")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use agentforge_core::domain::workflow::{WorkflowDraft, WorkflowId, WorkflowPatch};

    use super::SqlWorkflowRepository;
    use crate::migrations;
    use crate::repositories::WorkflowRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn only_active_workflows_match_their_trigger() {
        let pool = setup_pool().await;
        let repo = SqlWorkflowRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T08:00:00Z");

        let steps = serde_json::from_value(json!([
            {"step": 1, "type": "condition", "config": {"condition": "amount > 100"}}
        ]))
        .expect("decode steps");
        let active = WorkflowDraft {
            name: "Large order review".to_string(),
            trigger_event: "order_created".to_string(),
            steps,
            ..WorkflowDraft::default()
        }
        .into_workflow(WorkflowId("wf-active".to_string()), now);
        let paused = WorkflowPatch { is_active: Some(false), ..WorkflowPatch::default() }.apply(
            WorkflowDraft {
                name: "Paused".to_string(),
                trigger_event: "order_created".to_string(),
                ..WorkflowDraft::default()
            }
            .into_workflow(WorkflowId("wf-paused".to_string()), now),
            now,
        );

        repo.save(active.clone()).await.expect("save active");
        repo.save(paused.clone()).await.expect("save paused");

        let matched = repo.list_active_by_trigger("order_created").await.expect("list by trigger");
        assert_eq!(matched, vec![active.clone()]);
        assert!(repo.list_active_by_trigger("user_signup").await.expect("list").is_empty());

        let stored = repo.find_by_id(&paused.id).await.expect("find").expect("exists");
        assert_eq!(stored.version, 2);

        assert!(repo.delete(&active.id).await.expect("delete"));
        assert_eq!(repo.list().await.expect("list").len(), 1);

        pool.close().await;
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
