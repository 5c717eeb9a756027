use sqlx::{sqlite::SqliteRow, Row};

use agentforge_core::domain::assistant::{Assistant, AssistantId};

use super::rows::{decode_json, encode_json, parse_timestamp};
use super::{AssistantRepository, RepositoryError};
use crate::DbPool;

const ASSISTANT_COLUMNS: &str = "id, name, description, instructions, model, tools_json,
    file_search, code_interpreter, external_reference_id, is_active, created_by, created_at";

pub struct SqlAssistantRepository {
    pool: DbPool,
}

impl SqlAssistantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AssistantRepository for SqlAssistantRepository {
    async fn find_by_id(&self, id: &AssistantId) -> Result<Option<Assistant>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {ASSISTANT_COLUMNS} FROM ai_assistant WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(assistant_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Assistant>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSISTANT_COLUMNS} FROM ai_assistant ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(assistant_from_row).collect()
    }

    async fn save(&self, assistant: Assistant) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_assistant (
                id, name, description, instructions, model, tools_json, file_search,
                code_interpreter, external_reference_id, is_active, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                instructions = excluded.instructions,
                model = excluded.model,
                tools_json = excluded.tools_json,
                file_search = excluded.file_search,
                code_interpreter = excluded.code_interpreter,
                external_reference_id = excluded.external_reference_id,
                is_active = excluded.is_active",
        )
        .bind(&assistant.id.0)
        .bind(&assistant.name)
        .bind(&assistant.description)
        .bind(&assistant.instructions)
        .bind(&assistant.model)
        .bind(encode_json("tools_json", &assistant.tools)?)
        .bind(assistant.file_search)
        .bind(assistant.code_interpreter)
        .bind(&assistant.external_reference_id)
        .bind(assistant.is_active)
        .bind(&assistant.created_by)
        .bind(assistant.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &AssistantId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM ai_assistant WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

fn assistant_from_row(row: SqliteRow) -> Result<Assistant, RepositoryError> {
    let tools: String = row.try_get("tools_json")?;

    Ok(Assistant {
        id: AssistantId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        instructions: row.try_get("instructions")?,
        model: row.try_get("model")?,
        tools: decode_json("tools_json", &tools)?,
        file_search: row.try_get("file_search")?,
        code_interpreter: row.try_get("code_interpreter")?,
        external_reference_id: row.try_get("external_reference_id")?,
        is_active: row.try_get("is_active")?,
        created_by: row.try_get("created_by")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
