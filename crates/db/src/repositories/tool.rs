use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use agentforge_core::domain::tool::{Tool, ToolId, ToolRunStatus};

use super::rows::{
    decode_json, encode_json, is_unique_violation, parse_optional_timestamp, parse_timestamp,
    parse_u64,
};
use super::{RepositoryError, ToolRepository};
use crate::DbPool;

const TOOL_COLUMNS: &str = "id, name, function_name, description, category, parameters_json,
    endpoint_path, is_active, is_system, last_executed_at, last_execution_status,
    execution_count, avg_execution_time_ms, created_at, updated_at";

pub struct SqlToolRepository {
    pool: DbPool,
}

impl SqlToolRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ToolRepository for SqlToolRepository {
    async fn find_by_id(&self, id: &ToolId) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TOOL_COLUMNS} FROM agent_tool WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(tool_from_row).transpose()
    }

    async fn find_by_function_name(
        &self,
        function_name: &str,
    ) -> Result<Option<Tool>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {TOOL_COLUMNS} FROM agent_tool WHERE function_name = ?"))
                .bind(function_name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(tool_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Tool>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TOOL_COLUMNS} FROM agent_tool ORDER BY category ASC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(tool_from_row).collect()
    }

    async fn insert(&self, tool: Tool) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO agent_tool (
                id, name, function_name, description, category, parameters_json,
                endpoint_path, is_active, is_system, last_executed_at, last_execution_status,
                execution_count, avg_execution_time_ms, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tool.id.0)
        .bind(&tool.name)
        .bind(&tool.function_name)
        .bind(&tool.description)
        .bind(&tool.category)
        .bind(encode_json("parameters_json", &tool.parameters)?)
        .bind(&tool.endpoint_path)
        .bind(tool.is_active)
        .bind(tool.is_system)
        .bind(tool.last_executed_at.map(|at| at.to_rfc3339()))
        .bind(tool.last_execution_status.map(|status| status.as_str()))
        .bind(i64::try_from(tool.execution_count).unwrap_or(i64::MAX))
        .bind(tool.avg_execution_time_ms)
        .bind(tool.created_at.to_rfc3339())
        .bind(tool.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(RepositoryError::Conflict(format!(
                "Tool with function_name `{}` already exists",
                tool.function_name
            ))),
            Err(error) => Err(error.into()),
        }
    }

    async fn upsert_builtin(&self, tool: Tool) -> Result<Tool, RepositoryError> {
        sqlx::query(
            "INSERT INTO agent_tool (
                id, name, function_name, description, category, parameters_json,
                endpoint_path, is_active, is_system, execution_count, avg_execution_time_ms,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, 1, 0, 0, ?, ?)
            ON CONFLICT(function_name) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                parameters_json = excluded.parameters_json,
                endpoint_path = excluded.endpoint_path,
                is_active = 1,
                is_system = 1,
                updated_at = excluded.updated_at",
        )
        .bind(&tool.id.0)
        .bind(&tool.name)
        .bind(&tool.function_name)
        .bind(&tool.description)
        .bind(&tool.category)
        .bind(encode_json("parameters_json", &tool.parameters)?)
        .bind(&tool.endpoint_path)
        .bind(tool.created_at.to_rfc3339())
        .bind(tool.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_function_name(&tool.function_name).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("tool `{}` vanished after upsert", tool.function_name))
        })
    }

    async fn record_execution(
        &self,
        id: &ToolId,
        status: ToolRunStatus,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        // All right-hand sides read the pre-update row.
        let result = sqlx::query(
            "UPDATE agent_tool SET
                avg_execution_time_ms =
                    (avg_execution_time_ms * execution_count + ?) / (execution_count + 1),
                execution_count = execution_count + 1,
                last_executed_at = ?,
                last_execution_status = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(duration_ms as f64)
        .bind(at.to_rfc3339())
        .bind(status.as_str())
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn tool_from_row(row: SqliteRow) -> Result<Tool, RepositoryError> {
    let status = row
        .try_get::<Option<String>, _>("last_execution_status")?
        .map(|raw| {
            ToolRunStatus::parse(&raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown tool run status `{raw}`"))
            })
        })
        .transpose()?;
    let parameters: String = row.try_get("parameters_json")?;

    Ok(Tool {
        id: ToolId(row.try_get("id")?),
        name: row.try_get("name")?,
        function_name: row.try_get("function_name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        parameters: decode_json("parameters_json", &parameters)?,
        endpoint_path: row.try_get("endpoint_path")?,
        is_active: row.try_get("is_active")?,
        is_system: row.try_get("is_system")?,
        last_executed_at: parse_optional_timestamp(
            "last_executed_at",
            row.try_get("last_executed_at")?,
        )?,
        last_execution_status: status,
        execution_count: parse_u64("execution_count", row.try_get("execution_count")?)?,
        avg_execution_time_ms: row.try_get("avg_execution_time_ms")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
