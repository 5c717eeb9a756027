use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use agentforge_core::steps::{is_identifier, ActionKind, ActionPlan};

use super::{ActionWriter, RepositoryError};
use crate::DbPool;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

pub struct SqlActionWriter {
    pool: DbPool,
}

impl SqlActionWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ActionWriter for SqlActionWriter {
    async fn apply(&self, plan: &ActionPlan) -> Result<u64, RepositoryError> {
        ensure_identifier(&plan.table)?;
        ensure_identifier(&plan.match_field)?;
        for column in plan.data.keys() {
            ensure_identifier(column)?;
        }

        let table = &plan.table;
        let match_field = &plan.match_field;
        let columns: Vec<&String> = plan.data.keys().collect();
        let sql = match plan.kind {
            ActionKind::Insert => {
                let names = columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ");
                let placeholders = vec!["?"; columns.len()].join(", ");
                format!("INSERT INTO {table} ({names}) VALUES ({placeholders})")
            }
            ActionKind::Update => {
                let assignments =
                    columns.iter().map(|column| format!("{column} = ?")).collect::<Vec<_>>().join(", ");
                format!("UPDATE {table} SET {assignments} WHERE {match_field} = ?")
            }
            ActionKind::Delete => format!("DELETE FROM {table} WHERE {match_field} = ?"),
        };

        let mut query = sqlx::query(&sql);
        for value in plan.data.values() {
            query = bind_value(query, value);
        }
        if plan.kind != ActionKind::Insert {
            query = bind_value(query, &plan.match_value);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn ensure_identifier(name: &str) -> Result<(), RepositoryError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(RepositoryError::Rejected(format!("`{name}` is not a valid identifier")))
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(flag) => query.bind(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(number.as_f64()),
        },
        Value::String(text) => query.bind(text.clone()),
        other => query.bind(other.to_string()),
    }
}
