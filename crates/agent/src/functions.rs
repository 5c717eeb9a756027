use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use agentforge_core::config::FunctionsConfig;

use crate::backend::BackendError;

const SERVICE: &str = "function host";

/// Calls a platform function by name with a JSON argument object.
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// `Ok` only for 2xx answers. A 2xx body that is not JSON comes back as a
    /// JSON string.
    async fn invoke(&self, function_name: &str, arguments: &Value) -> Result<Value, BackendError>;
}

pub struct HttpFunctionInvoker {
    client: Client,
    base_url: String,
    service_key: SecretString,
    timeout: Duration,
}

impl HttpFunctionInvoker {
    pub fn new(
        base_url: impl Into<String>,
        service_key: SecretString,
        timeout_secs: u64,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .build()
            .map_err(|error| BackendError::Transport { service: SERVICE, message: error.to_string() })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    /// `None` unless both the base URL and the service key are configured.
    pub fn from_config(config: &FunctionsConfig) -> Result<Option<Self>, BackendError> {
        let Some((base_url, key)) = config.credential() else {
            return Ok(None);
        };
        Self::new(base_url, key.clone(), config.timeout_secs).map(Some)
    }

    fn endpoint(&self, function_name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, function_name.trim())
    }

    async fn call(&self, function_name: &str, arguments: &Value) -> Result<Value, BackendError> {
        let response = self
            .client
            .post(self.endpoint(function_name))
            .bearer_auth(self.service_key.expose_secret())
            .json(arguments)
            .send()
            .await
            .map_err(|error| BackendError::Transport { service: SERVICE, message: error.to_string() })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| BackendError::Transport { service: SERVICE, message: error.to_string() })?;
        if !status.is_success() {
            return Err(BackendError::Status { service: SERVICE, status: status.as_u16(), body });
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

#[async_trait]
impl FunctionInvoker for HttpFunctionInvoker {
    async fn invoke(&self, function_name: &str, arguments: &Value) -> Result<Value, BackendError> {
        tokio::time::timeout(self.timeout, self.call(function_name, arguments))
            .await
            .map_err(|_| BackendError::Timeout { service: SERVICE, seconds: self.timeout.as_secs() })?
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use agentforge_core::config::FunctionsConfig;

    use super::HttpFunctionInvoker;

    #[test]
    fn endpoint_joins_base_url_and_function_name() {
        let invoker = HttpFunctionInvoker::new(
            "https://functions.example.test/",
            SecretString::from("service-key".to_string()),
            60,
        )
        .expect("build invoker");
        assert_eq!(
            invoker.endpoint("fetch-oil-prices"),
            "https://functions.example.test/functions/v1/fetch-oil-prices"
        );
    }

    #[test]
    fn missing_credentials_yield_no_invoker() {
        let config = FunctionsConfig { base_url: None, service_key: None, timeout_secs: 60 };
        let invoker = HttpFunctionInvoker::from_config(&config).expect("no transport error");
        assert!(invoker.is_none());
    }
}
