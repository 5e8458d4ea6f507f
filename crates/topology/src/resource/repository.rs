//! Repository resource: a container image registry repository

use super::account;
use crate::error::{Error, Result};
use crate::node::Stack;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Declared registry repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositorySpec {
    /// Repository name (lowercase registry path)
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl RepositorySpec {
    pub fn validate(&self, id: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config(id, "repository name must not be empty"));
        }
        let ok = self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c));
        if !ok {
            return Err(Error::config(
                id,
                format!("repository name '{}' must be lowercase alphanumeric with ._-/", self.name),
            ));
        }
        Ok(())
    }

    pub fn plan_properties(&self) -> Result<serde_json::Value> {
        Ok(json!({ "name": self.name }))
    }

    pub fn synthesized_outputs(&self, stack: &Stack) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "repository_uri".to_string(),
            format!("{}.dkr.ecr.{}.amazonaws.com/{}", account(stack), stack.region, self.name),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_name_rejected() {
        let spec = RepositorySpec {
            name: "Locator-Backend".to_string(),
            depends_on: Vec::new(),
        };
        assert!(spec.validate("backend").is_err());
    }

    #[test]
    fn test_repository_uri_shape() {
        let spec = RepositorySpec {
            name: "locator-backend".to_string(),
            depends_on: Vec::new(),
        };
        let stack = Stack {
            name: "locator".to_string(),
            region: "eu-west-2".to_string(),
            account: Some("123456789012".to_string()),
        };
        let outputs = spec.synthesized_outputs(&stack);
        assert_eq!(
            outputs["repository_uri"],
            "123456789012.dkr.ecr.eu-west-2.amazonaws.com/locator-backend"
        );
    }
}
