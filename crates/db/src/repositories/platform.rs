use serde_json::{json, Value};
use sqlx::{sqlite::SqliteRow, Row};

use super::{PlatformDataRepository, RepositoryError};
use crate::DbPool;

const PORT_MATCH_LIMIT: i64 = 5;

pub struct SqlPlatformDataRepository {
    pool: DbPool,
}

impl SqlPlatformDataRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn vessel_where(&self, column: &str, value: &str) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT id, name, imo, mmsi, vessel_type, flag, status, destination, eta, updated_at
             FROM vessel
             WHERE {column} = ?
             LIMIT 1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(vessel_json).transpose()
    }

    async fn count(&self, table: &str) -> Result<i64, RepositoryError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }
}

#[async_trait::async_trait]
impl PlatformDataRepository for SqlPlatformDataRepository {
    async fn vessel_by_imo(&self, imo: &str) -> Result<Option<Value>, RepositoryError> {
        self.vessel_where("imo", imo).await
    }

    async fn vessel_by_mmsi(&self, mmsi: &str) -> Result<Option<Value>, RepositoryError> {
        self.vessel_where("mmsi", mmsi).await
    }

    async fn ports_by_name(&self, name: &str) -> Result<Vec<Value>, RepositoryError> {
        let pattern = format!("%{}%", name.trim());
        let rows = sqlx::query(
            "SELECT id, name, country, region, port_type
             FROM port
             WHERE name LIKE ?
             ORDER BY name ASC
             LIMIT ?",
        )
        .bind(pattern)
        .bind(PORT_MATCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Value, RepositoryError> {
                Ok(json!({
                    "id": row.try_get::<String, _>("id")?,
                    "name": row.try_get::<String, _>("name")?,
                    "country": row.try_get::<Option<String>, _>("country")?,
                    "region": row.try_get::<Option<String>, _>("region")?,
                    "port_type": row.try_get::<Option<String>, _>("port_type")?,
                }))
            })
            .collect()
    }

    async fn subscriber_by_user(&self, user_id: &str) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query(
            "SELECT s.id, s.user_id, s.email, s.status, s.current_period_end,
                    p.id AS plan_id, p.name AS plan_name, p.price_cents, p.billing_interval
             FROM subscriber s
             LEFT JOIN subscription_plan p ON p.id = s.plan_id
             WHERE s.user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Value, RepositoryError> {
            let plan = match row.try_get::<Option<String>, _>("plan_id")? {
                Some(plan_id) => json!({
                    "id": plan_id,
                    "name": row.try_get::<Option<String>, _>("plan_name")?,
                    "price_cents": row.try_get::<Option<i64>, _>("price_cents")?,
                    "billing_interval": row.try_get::<Option<String>, _>("billing_interval")?,
                }),
                None => Value::Null,
            };
            Ok(json!({
                "id": row.try_get::<String, _>("id")?,
                "user_id": row.try_get::<String, _>("user_id")?,
                "email": row.try_get::<Option<String>, _>("email")?,
                "status": row.try_get::<String, _>("status")?,
                "current_period_end": row.try_get::<Option<String>, _>("current_period_end")?,
                "plan": plan,
            }))
        })
        .transpose()
    }

    async fn active_plans(&self) -> Result<Vec<Value>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, price_cents, billing_interval
             FROM subscription_plan
             WHERE is_active = 1
             ORDER BY price_cents ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Value, RepositoryError> {
                Ok(json!({
                    "id": row.try_get::<String, _>("id")?,
                    "name": row.try_get::<String, _>("name")?,
                    "price_cents": row.try_get::<i64, _>("price_cents")?,
                    "billing_interval": row.try_get::<String, _>("billing_interval")?,
                }))
            })
            .collect()
    }

    async fn platform_stats(&self) -> Result<Value, RepositoryError> {
        Ok(json!({
            "total_vessels": self.count("vessel").await?,
            "total_ports": self.count("port").await?,
            "total_companies": self.count("company").await?,
            "total_brokers": self.count("broker_profile").await?,
        }))
    }
}

fn vessel_json(row: SqliteRow) -> Result<Value, RepositoryError> {
    Ok(json!({
        "id": row.try_get::<String, _>("id")?,
        "name": row.try_get::<String, _>("name")?,
        "imo": row.try_get::<Option<String>, _>("imo")?,
        "mmsi": row.try_get::<Option<String>, _>("mmsi")?,
        "vessel_type": row.try_get::<Option<String>, _>("vessel_type")?,
        "flag": row.try_get::<Option<String>, _>("flag")?,
        "status": row.try_get::<Option<String>, _>("status")?,
        "destination": row.try_get::<Option<String>, _>("destination")?,
        "eta": row.try_get::<Option<String>, _>("eta")?,
        "updated_at": row.try_get::<String, _>("updated_at")?,
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SqlPlatformDataRepository;
    use crate::migrations;
    use crate::repositories::PlatformDataRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn platform_lookups_answer_as_json() {
        let pool = setup_pool().await;
        seed(&pool).await;
        let repo = SqlPlatformDataRepository::new(pool.clone());

        let vessel = repo.vessel_by_imo("9321483").await.expect("lookup").expect("vessel exists");
        assert_eq!(vessel["name"], json!("Nordic Star"));
        assert_eq!(vessel["destination"], json!("Rotterdam"));
        assert!(repo.vessel_by_mmsi("000000000").await.expect("lookup").is_none());

        let ports = repo.ports_by_name("rotter").await.expect("ports");
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0]["country"], json!("NL"));

        let subscriber =
            repo.subscriber_by_user("user-7").await.expect("lookup").expect("subscriber exists");
        assert_eq!(subscriber["plan"]["name"], json!("Broker Pro"));

        assert_eq!(repo.active_plans().await.expect("plans").len(), 1);

        let stats = repo.platform_stats().await.expect("stats");
        assert_eq!(
            stats,
            json!({"total_vessels": 1, "total_ports": 2, "total_companies": 0, "total_brokers": 0})
        );

        pool.close().await;
    }

    async fn seed(pool: &DbPool) {
        for statement in [
            "INSERT INTO vessel (id, name, imo, mmsi, destination)
             VALUES ('v-1', 'Nordic Star', '9321483', '244660000', 'Rotterdam')",
            "INSERT INTO port (id, name, country) VALUES ('p-1', 'Rotterdam', 'NL')",
            "INSERT INTO port (id, name, country) VALUES ('p-2', 'Antwerp', 'BE')",
            "INSERT INTO subscription_plan (id, name, price_cents) VALUES ('plan-pro', 'Broker Pro', 4900)",
            "INSERT INTO subscription_plan (id, name, is_active) VALUES ('plan-old', 'Legacy', 0)",
            "INSERT INTO subscriber (id, user_id, email, plan_id)
             VALUES ('s-1', 'user-7', 'ops@example.com', 'plan-pro')",
        ] {
            sqlx::query(statement).execute(pool).await.expect("seed platform data");
        }
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
