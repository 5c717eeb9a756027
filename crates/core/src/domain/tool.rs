use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRunStatus {
    Success,
    Error,
}

impl ToolRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A persisted, invocable capability. `function_name` is unique across the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub id: ToolId,
    pub name: String,
    pub function_name: String,
    pub description: Option<String>,
    pub category: String,
    pub parameters: Value,
    pub endpoint_path: String,
    pub is_active: bool,
    pub is_system: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_execution_status: Option<ToolRunStatus>,
    pub execution_count: u64,
    pub avg_execution_time_ms: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// Name under which the tool is exposed to a hosted assistant.
    pub fn remote_function_name(&self) -> String {
        remote_function_name(&self.function_name)
    }
}

/// Hosted backends accept `[a-z0-9_]` function names only.
pub fn remote_function_name(function_name: &str) -> String {
    function_name
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Input for creating a custom tool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub endpoint_path: Option<String>,
}

impl ToolDraft {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("Tool missing required field: name".to_string());
        }
        if self.function_name.trim().is_empty() {
            missing.push("Tool missing required field: function_name".to_string());
        }
        missing
    }

    pub fn into_tool(self, id: ToolId, is_system: bool, now: DateTime<Utc>) -> Tool {
        let endpoint_path = self
            .endpoint_path
            .unwrap_or_else(|| format!("/functions/v1/{}", self.function_name.trim()));
        Tool {
            id,
            name: self.name.trim().to_string(),
            function_name: self.function_name.trim().to_string(),
            description: self.description,
            category: self.category.unwrap_or_else(|| "custom".to_string()),
            parameters: self.parameters.unwrap_or_else(|| Value::Object(Default::default())),
            endpoint_path,
            is_active: true,
            is_system,
            last_executed_at: None,
            last_execution_status: None,
            execution_count: 0,
            avg_execution_time_ms: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltinTool {
    pub name: &'static str,
    pub function_name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

impl BuiltinTool {
    pub fn draft(&self) -> ToolDraft {
        ToolDraft {
            name: self.name.to_string(),
            function_name: self.function_name.to_string(),
            description: Some(self.description.to_string()),
            category: Some(self.category.to_string()),
            parameters: None,
            endpoint_path: None,
        }
    }
}

/// Canonical catalog of platform functions that discovery upserts.
pub const BUILTIN_TOOLS: &[BuiltinTool] = &[
    BuiltinTool {
        name: "AI Vessel Search",
        function_name: "ai-vessel-search",
        category: "vessel",
        description: "Search for vessel information using AI",
    },
    BuiltinTool {
        name: "AI Vessel Port Search",
        function_name: "ai-vessel-port-search",
        category: "vessel",
        description: "Search vessel and port data with AI analysis",
    },
    BuiltinTool {
        name: "Autofill Vessel Data",
        function_name: "autofill-vessel-data",
        category: "vessel",
        description: "Auto-populate vessel information from databases",
    },
    BuiltinTool {
        name: "Autofill Port Data",
        function_name: "autofill-port-data",
        category: "port",
        description: "Auto-populate port information",
    },
    BuiltinTool {
        name: "Autofill Refinery Data",
        function_name: "autofill-refinery-data",
        category: "refinery",
        description: "Auto-populate refinery information",
    },
    BuiltinTool {
        name: "Autofill Company Data",
        function_name: "autofill-company-data",
        category: "company",
        description: "Auto-populate company information",
    },
    BuiltinTool {
        name: "Send Confirmation Email",
        function_name: "send-confirmation-email",
        category: "email",
        description: "Send confirmation emails to users",
    },
    BuiltinTool {
        name: "Send Automated Email",
        function_name: "send-automated-email",
        category: "email",
        description: "Send automated emails based on triggers",
    },
    BuiltinTool {
        name: "Send Billing Email",
        function_name: "send-billing-email",
        category: "billing",
        description: "Send billing-related emails",
    },
    BuiltinTool {
        name: "Check Subscription",
        function_name: "check-subscription",
        category: "subscription",
        description: "Check user subscription status",
    },
    BuiltinTool {
        name: "Check Broker Membership",
        function_name: "check-broker-membership",
        category: "broker",
        description: "Verify broker membership status",
    },
    BuiltinTool {
        name: "Create Checkout",
        function_name: "create-checkout",
        category: "billing",
        description: "Create Stripe checkout session",
    },
    BuiltinTool {
        name: "Create Broker Checkout",
        function_name: "create-broker-checkout",
        category: "broker",
        description: "Create broker membership checkout",
    },
    BuiltinTool {
        name: "Fetch Oil Prices",
        function_name: "fetch-oil-prices",
        category: "market",
        description: "Fetch current oil prices from API",
    },
    BuiltinTool {
        name: "Test Email Connection",
        function_name: "test-email-connection",
        category: "email",
        description: "Test SMTP/IMAP email configuration",
    },
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;

    use super::{ToolDraft, ToolId, ToolRunStatus, BUILTIN_TOOLS};

    #[test]
    fn builtin_function_names_are_unique() {
        let names: HashSet<_> = BUILTIN_TOOLS.iter().map(|tool| tool.function_name).collect();
        assert_eq!(names.len(), BUILTIN_TOOLS.len());
    }

    #[test]
    fn draft_defaults_category_and_endpoint() {
        let tool = ToolDraft {
            name: " Lookup Cargo ".to_string(),
            function_name: "lookup-cargo".to_string(),
            ..ToolDraft::default()
        }
        .into_tool(ToolId("t-1".to_string()), false, Utc::now());

        assert_eq!(tool.name, "Lookup Cargo");
        assert_eq!(tool.category, "custom");
        assert_eq!(tool.endpoint_path, "/functions/v1/lookup-cargo");
        assert_eq!(tool.remote_function_name(), "lookup_cargo");
        assert!(!tool.is_system);
    }

    #[test]
    fn draft_reports_each_blank_required_field() {
        let missing = ToolDraft { name: "  ".to_string(), ..ToolDraft::default() }.missing_fields();
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn run_status_parses_storage_encoding() {
        assert_eq!(ToolRunStatus::parse("error"), Some(ToolRunStatus::Error));
        assert_eq!(ToolRunStatus::parse(ToolRunStatus::Success.as_str()), Some(ToolRunStatus::Success));
        assert_eq!(ToolRunStatus::parse("pending"), None);
    }
}
