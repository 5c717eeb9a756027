use sqlx::{sqlite::SqliteRow, Row};

use agentforge_core::domain::agent::{Agent, AgentId};
use agentforge_core::domain::assistant::AssistantId;

use super::rows::{decode_json, encode_json, parse_timestamp};
use super::{AgentRepository, RepositoryError};
use crate::DbPool;

const AGENT_COLUMNS: &str = "id, name, description, system_prompt, model, tools_json,
    triggers_json, behaviors_json, linked_assistant_id, is_active, created_by, created_at";

pub struct SqlAgentRepository {
    pool: DbPool,
}

impl SqlAgentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentRepository for SqlAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM ai_agent WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(agent_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Agent>, RepositoryError> {
        let rows =
            sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM ai_agent ORDER BY created_at DESC"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(agent_from_row).collect()
    }

    async fn save(&self, agent: Agent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_agent (
                id, name, description, system_prompt, model, tools_json, triggers_json,
                behaviors_json, linked_assistant_id, is_active, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                system_prompt = excluded.system_prompt,
                model = excluded.model,
                tools_json = excluded.tools_json,
                triggers_json = excluded.triggers_json,
                behaviors_json = excluded.behaviors_json,
                linked_assistant_id = excluded.linked_assistant_id,
                is_active = excluded.is_active",
        )
        .bind(&agent.id.0)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.system_prompt)
        .bind(&agent.model)
        .bind(encode_json("tools_json", &agent.tools)?)
        .bind(encode_json("triggers_json", &agent.triggers)?)
        .bind(encode_json("behaviors_json", &agent.behaviors)?)
        .bind(agent.linked_assistant_id.as_ref().map(|id| id.0.as_str()))
        .bind(agent.is_active)
        .bind(&agent.created_by)
        .bind(agent.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM ai_agent WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

fn agent_from_row(row: SqliteRow) -> Result<Agent, RepositoryError> {
    let tools: String = row.try_get("tools_json")?;
    let triggers: String = row.try_get("triggers_json")?;
    let behaviors: String = row.try_get("behaviors_json")?;

    Ok(Agent {
        id: AgentId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        system_prompt: row.try_get("system_prompt")?,
        model: row.try_get("model")?,
        tools: decode_json("tools_json", &tools)?,
        triggers: decode_json("triggers_json", &triggers)?,
        behaviors: decode_json("behaviors_json", &behaviors)?,
        linked_assistant_id: row
            .try_get::<Option<String>, _>("linked_assistant_id")?
            .map(AssistantId),
        is_active: row.try_get("is_active")?,
        created_by: row.try_get("created_by")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use agentforge_core::domain::agent::{AgentDraft, AgentId};
    use agentforge_core::domain::assistant::{AssistantDraft, AssistantId, ToolRef};

    use super::SqlAgentRepository;
    use crate::migrations;
    use crate::repositories::{AgentRepository, AssistantRepository, SqlAssistantRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn linked_assistant_is_cleared_when_assistant_is_deleted() {
        let pool = setup_pool().await;
        let agents = SqlAgentRepository::new(pool.clone());
        let assistants = SqlAssistantRepository::new(pool.clone());
        let now = parse_ts("2026-03-01T08:00:00Z");

        let assistant = AssistantDraft {
            name: "Promoted".to_string(),
            instructions: "Send confirmations.".to_string(),
            ..AssistantDraft::default()
        }
        .into_assistant(AssistantId("asst-1".to_string()), None, "gpt-4o", now);
        assistants.save(assistant.clone()).await.expect("save assistant");

        let mut agent = AgentDraft {
            name: "Order Confirmer".to_string(),
            system_prompt: "Send confirmations.".to_string(),
            tools: vec![ToolRef::stub("send-confirmation-email")],
            triggers: vec!["order_created".to_string()],
            behaviors: Some(json!({"tone": "formal"})),
            ..AgentDraft::default()
        }
        .into_agent(AgentId("agent-1".to_string()), "gpt-4o", now);
        agent.linked_assistant_id = Some(assistant.id.clone());
        agents.save(agent.clone()).await.expect("save agent");

        assert_eq!(agents.find_by_id(&agent.id).await.expect("find"), Some(agent.clone()));

        assistants.delete(&assistant.id).await.expect("delete assistant");
        let unlinked = agents.find_by_id(&agent.id).await.expect("find").expect("agent kept");
        assert_eq!(unlinked.linked_assistant_id, None);
        assert_eq!(unlinked.triggers, vec!["order_created".to_string()]);

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
