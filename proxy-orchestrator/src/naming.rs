//! Deterministic workspace names.
//!
//! A name is `MCP_<id>_<description>` where both components are escaped so
//! that they only contain ASCII alphanumerics and `-XX` byte escapes. The `_`
//! separators can therefore never occur inside a component, which keeps the
//! mapping injective even for hostile description strings.
//!
//! An identity without a description gets the component `-workspace`. A `-`
//! produced by escaping is always followed by two upper-case hex digits, so
//! this can never collide with an identity whose description is literally
//! `workspace`.

use crate::error::{OrchestratorError, Result};
use crate::provisioning::TokenDetails;
use std::fmt::Write;

const NAME_PREFIX: &str = "MCP";
const MISSING_DESCRIPTION: &str = "-workspace";

/// Derive the workspace name for a verified identity.
pub fn workspace_name(id: &str, description: Option<&str>) -> Result<String> {
    if id.is_empty() {
        return Err(OrchestratorError::InvalidInput(
            "identity id must not be empty".to_string(),
        ));
    }

    let description = match description {
        Some(description) => escape_component(description),
        None => MISSING_DESCRIPTION.to_string(),
    };

    Ok(format!("{NAME_PREFIX}_{}_{description}", escape_component(id)))
}

pub fn workspace_name_for(details: &TokenDetails) -> Result<String> {
    workspace_name(&details.id, details.description.as_deref())
}

fn escape_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() {
            escaped.push(byte as char);
        } else {
            // Writing to a String cannot fail
            let _ = write!(escaped, "-{byte:02X}");
        }
    }
    escaped
}
