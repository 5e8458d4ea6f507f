//! Task definition resource: a container and its runtime sizing
//!
//! The task is where most cross-node wiring happens. Environment values
//! may look up parameters (resolved at plan time) or reference upstream
//! outputs (kept as tokens), the image may point at a repository node,
//! and secret handles name a secret node plus a key in its document.

use super::Dependency;
use crate::error::{Error, Result};
use crate::node::{ResourceKind, Stack};
use crate::provider::ParameterStore;
use crate::value::{EnvValue, SecretKeyRef, Template};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Container image source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Image {
    /// Image built into a repository node of this topology
    Registry {
        repository: String,
        #[serde(default = "default_tag")]
        tag: String,
    },
    /// Opaque image URI pulled from elsewhere
    Uri(String),
}

fn default_tag() -> String {
    "latest".to_string()
}

impl Image {
    fn validate(&self, id: &str) -> Result<()> {
        match self {
            Image::Registry { repository, tag } => {
                if repository.is_empty() {
                    return Err(Error::config(id, "image repository must name a node"));
                }
                if tag.is_empty() {
                    return Err(Error::config(id, "image tag must not be empty"));
                }
            }
            Image::Uri(uri) => {
                if uri.is_empty() {
                    return Err(Error::config(id, "image uri must not be empty"));
                }
            }
        }
        Ok(())
    }

    fn plan_value(&self) -> String {
        match self {
            Image::Registry { repository, tag } => {
                format!("${{{repository}.repository_uri}}:{tag}")
            }
            Image::Uri(uri) => uri.clone(),
        }
    }
}

/// Single container launched by the task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerSpec {
    pub image: Image,
    /// Plain values, `${node.output}` templates, or parameter lookups
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,
    /// Values injected from a secret node's document
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretKeyRef>,
    #[serde(default = "default_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub log_stream_prefix: Option<String>,
}

fn default_port() -> Option<u16> {
    Some(80)
}

/// Declared task definition shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory")]
    pub memory_mib: u32,
    pub container: ContainerSpec,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    512
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TaskSpec {
    pub fn validate(&self, id: &str) -> Result<()> {
        let m = self.memory_mib;
        let sizing_ok = match self.cpu {
            256 => matches!(m, 512 | 1024 | 2048),
            512 => (1024..=4096).contains(&m) && m % 1024 == 0,
            1024 => (2048..=8192).contains(&m) && m % 1024 == 0,
            2048 => (4096..=16384).contains(&m) && m % 1024 == 0,
            4096 => (8192..=30720).contains(&m) && m % 1024 == 0,
            other => {
                return Err(Error::config(
                    id,
                    format!(
                        "cpu {other} is not a valid task size (use 256, 512, 1024, 2048 or 4096)"
                    ),
                ));
            }
        };
        if !sizing_ok {
            return Err(Error::config(
                id,
                format!("memory {m} MiB is not valid for cpu {}", self.cpu),
            ));
        }
        self.container.image.validate(id)?;
        if self.container.port == Some(0) {
            return Err(Error::config(id, "container port must be non-zero"));
        }
        for (name, value) in &self.container.environment {
            if !is_env_name(name) {
                return Err(Error::config(
                    id,
                    format!("'{name}' is not a valid environment variable name"),
                ));
            }
            if let EnvValue::Lookup { parameter } = value
                && parameter.is_empty()
            {
                return Err(Error::config(
                    id,
                    format!("environment variable '{name}' has an empty parameter key"),
                ));
            }
        }
        for (name, handle) in &self.container.secrets {
            if !is_env_name(name) {
                return Err(Error::config(
                    id,
                    format!("'{name}' is not a valid environment variable name"),
                ));
            }
            if handle.secret.is_empty() || handle.key.is_empty() {
                return Err(Error::config(
                    id,
                    format!("secret handle '{name}' must name a secret node and a key"),
                ));
            }
        }
        Ok(())
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        let mut deps = Vec::new();
        if let Image::Registry { repository, .. } = &self.container.image {
            deps.push(Dependency::structural(
                "image.repository",
                repository,
                ResourceKind::Repository,
            ));
        }
        for (name, value) in &self.container.environment {
            for reference in value.refs() {
                deps.push(Dependency::output(
                    format!("environment.{name}"),
                    reference.node,
                    reference.output,
                ));
            }
        }
        for (name, handle) in &self.container.secrets {
            deps.push(Dependency::structural(
                format!("secrets.{name}"),
                &handle.secret,
                ResourceKind::Secret,
            ));
        }
        deps
    }

    /// Resolve parameter lookups now; leave output references as tokens
    pub fn plan_properties(
        &self,
        id: &str,
        params: &dyn ParameterStore,
    ) -> Result<serde_json::Value> {
        let mut environment = BTreeMap::new();
        for (name, value) in &self.container.environment {
            let rendered = match value {
                EnvValue::Lookup { parameter } => params.get(parameter)?,
                EnvValue::Literal(raw) => Template::parse(raw).to_token_string(),
            };
            environment.insert(name.clone(), rendered);
        }
        let secrets: BTreeMap<_, _> = self
            .container
            .secrets
            .iter()
            .map(|(name, handle)| {
                (
                    name.clone(),
                    format!("${{{}.secret_arn}}:{}", handle.secret, handle.key),
                )
            })
            .collect();
        Ok(json!({
            "family": id,
            "cpu": self.cpu,
            "memory_mib": self.memory_mib,
            "container": {
                "name": id,
                "image": self.container.image.plan_value(),
                "environment": environment,
                "secrets": secrets,
                "port": self.container.port,
                "log_stream_prefix": self.container.log_stream_prefix,
            },
        }))
    }

    pub fn synthesized_outputs(&self, id: &str, stack: &Stack) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "task_definition_arn".to_string(),
            format!(
                "arn:aws:ecs:{}:{}:task-definition/{}-{}:1",
                stack.region,
                super::account(stack),
                stack.name,
                id,
            ),
        )])
    }
}
