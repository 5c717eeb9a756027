use std::fs;
use std::path::Path;

use agentforge_core::blueprint::{summarize, validate};
use serde_json::{json, Value};

use crate::commands::CommandResult;

/// Structural check of a Blueprint file; no config or database needed.
pub fn run(path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                "io",
                format!("could not read `{}`: {error}", path.display()),
                2,
            );
        }
    };
    let blueprint: Value = match serde_json::from_str(&raw) {
        Ok(blueprint) => blueprint,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                "parse",
                format!("`{}` is not valid JSON: {error}", path.display()),
                3,
            );
        }
    };

    let report = validate(&blueprint);
    let details = json!({"errors": report.errors, "summary": summarize(&blueprint)});
    if report.valid {
        CommandResult::success_with("validate", "blueprint is valid", Some(details))
    } else {
        CommandResult::failure_with(
            "validate",
            "validation",
            format!("blueprint has {} error(s)", report.errors.len()),
            1,
            Some(details),
        )
    }
}
