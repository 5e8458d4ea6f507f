//! Secret resource: a generated credential pair
//!
//! A secret is a JSON document seeded from a fixed template plus one
//! generated key. Planning only ever sees reference tokens; the value is
//! generated (or reused) by the secret store during apply.

use super::pseudo_id;
use crate::error::{Error, Result};
use crate::node::Stack;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

const PUNCTUATION: &str = "!#$%&*+-.:=?@^_~";

/// Declared secret shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecretSpec {
    /// Secret name in the secret store
    pub name: String,
    /// Fixed keys included verbatim (e.g. `username = "postgres"`)
    #[serde(default)]
    pub template: BTreeMap<String, String>,
    /// Key whose value is generated
    pub generate_key: String,
    /// Generated value length
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default)]
    pub exclude_punctuation: bool,
    #[serde(default)]
    pub include_space: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_length() -> usize {
    32
}

impl SecretSpec {
    pub fn validate(&self, id: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config(id, "secret name must not be empty"));
        }
        if self.generate_key.is_empty() {
            return Err(Error::config(id, "generate_key must not be empty"));
        }
        if self.template.contains_key(&self.generate_key) {
            return Err(Error::config(
                id,
                format!("generate_key '{}' collides with a template key", self.generate_key),
            ));
        }
        if self.length < 8 || self.length > 128 {
            return Err(Error::config(id, "generated length must be between 8 and 128"));
        }
        Ok(())
    }

    /// Check whether a key is part of the credential document
    pub fn has_key(&self, key: &str) -> bool {
        key == self.generate_key || self.template.contains_key(key)
    }

    /// Generate a value for `generate_key` per the declared options
    pub fn generate_value(&self, rng: &mut impl Rng) -> String {
        let mut charset: Vec<char> = ('a'..='z').chain('A'..='Z').chain('0'..='9').collect();
        if !self.exclude_punctuation {
            charset.extend(PUNCTUATION.chars());
        }
        if self.include_space {
            charset.push(' ');
        }
        (0..self.length)
            .map(|_| charset[rng.random_range(0..charset.len())])
            .collect()
    }

    /// Assemble the full credential document around a generated value
    pub fn credential_document(&self, generated: &str) -> BTreeMap<String, String> {
        let mut doc = self.template.clone();
        doc.insert(self.generate_key.clone(), generated.to_string());
        doc
    }

    pub fn plan_properties(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "name": self.name,
            "template": self.template,
            "generate_key": self.generate_key,
            "length": self.length,
            "exclude_punctuation": self.exclude_punctuation,
            "include_space": self.include_space,
        }))
    }

    pub fn synthesized_outputs(&self, id: &str, stack: &Stack) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "secret_arn".to_string(),
            format!(
                "arn:aws:secretsmanager:{}:{}:secret:{}-{}",
                stack.region,
                super::account(stack),
                self.name,
                pseudo_id(stack, id, "secret", 6),
            ),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn spec() -> SecretSpec {
        SecretSpec {
            name: "locator-postgres-credentials".to_string(),
            template: BTreeMap::from([("username".to_string(), "postgres".to_string())]),
            generate_key: "password".to_string(),
            length: 32,
            exclude_punctuation: true,
            include_space: false,
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn test_generate_respects_options() {
        let s = spec();
        let mut rng = StdRng::seed_from_u64(7);
        let value = s.generate_value(&mut rng);
        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_with_punctuation_allowed() {
        let mut s = spec();
        s.exclude_punctuation = false;
        s.length = 64;
        let mut rng = StdRng::seed_from_u64(7);
        let value = s.generate_value(&mut rng);
        assert_eq!(value.len(), 64);
        assert!(!value.contains(' '));
    }

    #[test]
    fn test_credential_document_merges_template() {
        let s = spec();
        let doc = s.credential_document("hunter2hunter2");
        assert_eq!(doc["username"], "postgres");
        assert_eq!(doc["password"], "hunter2hunter2");
    }

    #[test]
    fn test_generate_key_collision_rejected() {
        let mut s = spec();
        s.template.insert("password".to_string(), "fixed".to_string());
        assert!(s.validate("db-credentials").is_err());
    }

    #[test]
    fn test_has_key() {
        let s = spec();
        assert!(s.has_key("password"));
        assert!(s.has_key("username"));
        assert!(!s.has_key("token"));
    }
}
