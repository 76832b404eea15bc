// src/resource/urn.rs

//! URN construction and parsing.
//!
//! Format: `urn:pulumi:<stack>::<project>::<qualified type>::<name>`, where
//! the qualified type is the `$`-joined chain of ancestor types (the root
//! stack excluded) ending in the resource's own type.

use crate::errors::{Result, RuntimeError};
use crate::resource::ROOT_STACK_TYPE;

const URN_PREFIX: &str = "urn:pulumi:";

/// Build a URN. `parent_qualified_type` is the qualified type of the parent,
/// or `None` for top-level resources.
pub fn create_urn(
    stack: &str,
    project: &str,
    parent_qualified_type: Option<&str>,
    resource_type: &str,
    name: &str,
) -> String {
    let qualified = match parent_qualified_type {
        Some(parent) if !parent.is_empty() && parent != ROOT_STACK_TYPE => {
            format!("{parent}${resource_type}")
        }
        _ => resource_type.to_string(),
    };
    format!("{URN_PREFIX}{stack}::{project}::{qualified}::{name}")
}

/// Parsed pieces of a URN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrnParts {
    pub stack: String,
    pub project: String,
    pub qualified_type: String,
    pub name: String,
}

impl UrnParts {
    /// The resource's own type (last segment of the qualified type).
    pub fn resource_type(&self) -> &str {
        self.qualified_type
            .rsplit('$')
            .next()
            .unwrap_or(&self.qualified_type)
    }
}

pub fn parse_urn(urn: &str) -> Result<UrnParts> {
    let rest = urn
        .strip_prefix(URN_PREFIX)
        .ok_or_else(|| RuntimeError::InvalidArgument(format!("malformed URN: {urn}")))?;
    // Names may themselves contain "::", so split from the left only three times.
    let mut parts = rest.splitn(4, "::");
    let (Some(stack), Some(project), Some(qualified_type), Some(name)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(RuntimeError::InvalidArgument(format!("malformed URN: {urn}")));
    };
    Ok(UrnParts {
        stack: stack.to_string(),
        project: project.to_string(),
        qualified_type: qualified_type.to_string(),
        name: name.to_string(),
    })
}
