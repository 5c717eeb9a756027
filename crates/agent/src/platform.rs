use std::sync::Arc;

use serde_json::{json, Value};

use agentforge_core::errors::ApplicationError;
use agentforge_db::repositories::PlatformDataRepository;

/// The fixed set of read-only lookups exposed to hosted assistants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformQuery {
    VesselByImo { imo: String },
    VesselByMmsi { mmsi: String },
    PortByName { name: String },
    SubscriptionInfo { user_id: String },
    SubscriptionPlans,
    PlatformStats,
}

impl PlatformQuery {
    /// Reads `{query_type, query_params}`.
    pub fn from_arguments(arguments: &Value) -> Result<Self, ApplicationError> {
        let query_type = arguments.get("query_type").and_then(Value::as_str).unwrap_or_default();
        let params = arguments.get("query_params").cloned().unwrap_or_else(|| json!({}));

        let query = match query_type {
            "vessel_by_imo" => Self::VesselByImo { imo: param(&params, "imo")? },
            "vessel_by_mmsi" => Self::VesselByMmsi { mmsi: param(&params, "mmsi")? },
            "port_by_name" => Self::PortByName { name: param(&params, "name")? },
            "subscription_info" => Self::SubscriptionInfo { user_id: param(&params, "user_id")? },
            "subscription_plans" => Self::SubscriptionPlans,
            "platform_stats" => Self::PlatformStats,
            other => {
                return Err(ApplicationError::validation(format!(
                    "unknown platform query type `{other}`"
                )))
            }
        };
        Ok(query)
    }
}

/// Identifiers arrive as strings or bare numbers.
fn param(params: &Value, key: &str) -> Result<String, ApplicationError> {
    match params.get(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        _ => Err(ApplicationError::validation(format!("query_params.{key} is required"))),
    }
}

#[derive(Clone)]
pub struct PlatformData {
    repository: Arc<dyn PlatformDataRepository>,
}

impl PlatformData {
    pub fn new(repository: Arc<dyn PlatformDataRepository>) -> Self {
        Self { repository }
    }

    /// Answers `{data}`; a lookup with no match answers `{data: null}`.
    pub async fn query(&self, query: &PlatformQuery) -> Result<Value, ApplicationError> {
        let data = match query {
            PlatformQuery::VesselByImo { imo } => {
                self.repository.vessel_by_imo(imo).await?.unwrap_or(Value::Null)
            }
            PlatformQuery::VesselByMmsi { mmsi } => {
                self.repository.vessel_by_mmsi(mmsi).await?.unwrap_or(Value::Null)
            }
            PlatformQuery::PortByName { name } => {
                Value::Array(self.repository.ports_by_name(name).await?)
            }
            PlatformQuery::SubscriptionInfo { user_id } => {
                self.repository.subscriber_by_user(user_id).await?.unwrap_or(Value::Null)
            }
            PlatformQuery::SubscriptionPlans => Value::Array(self.repository.active_plans().await?),
            PlatformQuery::PlatformStats => self.repository.platform_stats().await?,
        };
        Ok(json!({ "data": data }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use agentforge_db::migrations::run_pending;
    use agentforge_db::repositories::SqlPlatformDataRepository;
    use agentforge_db::{connect_with_settings, DbPool};

    use super::{PlatformData, PlatformQuery};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        pool
    }

    #[test]
    fn arguments_decode_into_queries() {
        let query = PlatformQuery::from_arguments(&json!({
            "query_type": "vessel_by_imo",
            "query_params": {"imo": 9321483}
        }))
        .expect("decode");
        assert_eq!(query, PlatformQuery::VesselByImo { imo: "9321483".to_string() });

        let stats = PlatformQuery::from_arguments(&json!({"query_type": "platform_stats"}))
            .expect("decode");
        assert_eq!(stats, PlatformQuery::PlatformStats);
    }

    #[test]
    fn unknown_query_type_and_missing_params_are_rejected() {
        let unknown = PlatformQuery::from_arguments(&json!({"query_type": "drop_tables"}))
            .expect_err("unknown type");
        assert_eq!(unknown.error_class(), "validation");

        let missing = PlatformQuery::from_arguments(&json!({
            "query_type": "port_by_name",
            "query_params": {}
        }))
        .expect_err("missing name");
        assert!(missing.to_string().contains("query_params.name"));
    }

    #[tokio::test]
    async fn queries_answer_data_envelopes() {
        let pool = setup_pool().await;
        sqlx::query("INSERT INTO vessel (id, name, imo, mmsi) VALUES ('v-1', 'Nordic Star', '9321483', '257123000')")
            .execute(&pool)
            .await
            .expect("seed vessel");

        let platform = PlatformData::new(Arc::new(SqlPlatformDataRepository::new(pool.clone())));

        let vessel = platform
            .query(&PlatformQuery::VesselByImo { imo: "9321483".to_string() })
            .await
            .expect("vessel");
        assert_eq!(vessel["data"]["name"], json!("Nordic Star"));

        let missing = platform
            .query(&PlatformQuery::VesselByMmsi { mmsi: "000000000".to_string() })
            .await
            .expect("no vessel");
        assert_eq!(missing, json!({"data": null}));

        let stats = platform.query(&PlatformQuery::PlatformStats).await.expect("stats");
        assert_eq!(stats["data"]["total_vessels"], json!(1));

        pool.close().await;
    }
}
