use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use agentforge_core::domain::assistant::AssistantId;
use agentforge_core::domain::conversation::{Conversation, ConversationId, ConversationMessage};

use super::rows::{decode_json, encode_json, parse_timestamp};
use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_thread(
        &self,
        external_thread_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, assistant_id, user_id, external_thread_id, messages_json, created_at,
                    updated_at
             FROM assistant_conversation
             WHERE external_thread_id = ?",
        )
        .bind(external_thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn insert(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO assistant_conversation (
                id, assistant_id, user_id, external_thread_id, messages_json, created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.assistant_id.0)
        .bind(&conversation.user_id)
        .bind(&conversation.external_thread_id)
        .bind(encode_json("messages_json", &conversation.messages)?)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_messages(
        &self,
        external_thread_id: &str,
        messages: Vec<ConversationMessage>,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE assistant_conversation
             SET messages_json = ?, updated_at = ?
             WHERE external_thread_id = ?",
        )
        .bind(encode_json("messages_json", &messages)?)
        .bind(at.to_rfc3339())
        .bind(external_thread_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    let messages: String = row.try_get("messages_json")?;

    Ok(Conversation {
        id: ConversationId(row.try_get("id")?),
        assistant_id: AssistantId(row.try_get("assistant_id")?),
        user_id: row.try_get("user_id")?,
        external_thread_id: row.try_get("external_thread_id")?,
        messages: decode_json("messages_json", &messages)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use agentforge_core::domain::assistant::{AssistantDraft, AssistantId};
    use agentforge_core::domain::conversation::{
        Conversation, ConversationId, ConversationMessage,
    };

    use super::SqlConversationRepository;
    use crate::migrations;
    use crate::repositories::{AssistantRepository, ConversationRepository, SqlAssistantRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn messages_are_replaced_by_thread() {
        let pool = setup_pool().await;
        let now = parse_ts("2026-03-01T08:00:00Z");
        let assistant = AssistantDraft {
            name: "Support".to_string(),
            instructions: "Help brokers.".to_string(),
            ..AssistantDraft::default()
        }
        .into_assistant(AssistantId("asst-1".to_string()), Some("asst_r".to_string()), "gpt-4o", now);
        SqlAssistantRepository::new(pool.clone()).save(assistant.clone()).await.expect("save");

        let repo = SqlConversationRepository::new(pool.clone());
        let conversation = Conversation {
            id: ConversationId("conv-1".to_string()),
            assistant_id: assistant.id.clone(),
            user_id: Some("user-7".to_string()),
            external_thread_id: "thread_abc".to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        repo.insert(conversation.clone()).await.expect("insert conversation");

        let messages = vec![
            ConversationMessage {
                id: "msg_1".to_string(),
                role: "user".to_string(),
                content: "Where is IMO 9321483?".to_string(),
                created_at: Some(1_772_352_000),
                raw: json!({"id": "msg_1"}),
            },
            ConversationMessage {
                id: "msg_2".to_string(),
                role: "assistant".to_string(),
                content: "Heading to Rotterdam.".to_string(),
                created_at: Some(1_772_352_005),
                raw: json!({"id": "msg_2"}),
            },
        ];
        let updated_at = parse_ts("2026-03-01T08:01:00Z");
        assert!(repo
            .replace_messages("thread_abc", messages.clone(), updated_at)
            .await
            .expect("replace messages"));
        assert!(!repo
            .replace_messages("thread_missing", Vec::new(), updated_at)
            .await
            .expect("no row"));

        let stored = repo.find_by_thread("thread_abc").await.expect("find").expect("exists");
        assert_eq!(stored.messages, messages);
        assert_eq!(stored.updated_at, updated_at);

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
