//! Network resource: VPC shape, availability zones, subnet tiers

use super::{is_valid_cidr, pseudo_id};
use crate::error::{Error, Result};
use crate::node::Stack;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

/// Subnet placement tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetTier {
    Public,
    Private,
    PrivateIsolated,
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::PrivateIsolated => "private-isolated",
        };
        write!(f, "{}", s)
    }
}

/// One subnet group inside a network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubnetSpec {
    pub name: String,
    pub tier: SubnetTier,
}

/// Declared network shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSpec {
    /// IPv4 block for the network
    pub cidr: String,
    /// Availability zones to spread subnets over
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
    /// NAT gateways to provision (0 keeps isolated tiers offline-only)
    #[serde(default)]
    pub nat_gateways: u8,
    /// Subnet groups, one per tier entry
    pub subnets: Vec<SubnetSpec>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_max_azs() -> u8 {
    2
}

impl NetworkSpec {
    pub fn validate(&self, id: &str) -> Result<()> {
        if !is_valid_cidr(&self.cidr) {
            return Err(Error::config(id, format!("'{}' is not a valid CIDR block", self.cidr)));
        }
        if self.max_azs == 0 || self.max_azs > 6 {
            return Err(Error::config(id, "max_azs must be between 1 and 6"));
        }
        if self.subnets.is_empty() {
            return Err(Error::config(id, "at least one subnet group is required"));
        }
        let mut seen = Vec::new();
        for subnet in &self.subnets {
            if subnet.name.is_empty() {
                return Err(Error::config(id, "subnet group name must not be empty"));
            }
            if seen.contains(&subnet.name.as_str()) {
                return Err(Error::config(
                    id,
                    format!("duplicate subnet group name '{}'", subnet.name),
                ));
            }
            seen.push(subnet.name.as_str());
        }
        if self.nat_gateways > 0 && !self.has_tier(SubnetTier::Public) {
            return Err(Error::config(id, "nat_gateways require a public subnet group"));
        }
        Ok(())
    }

    /// Check whether a tier is declared on this network
    pub fn has_tier(&self, tier: SubnetTier) -> bool {
        self.subnets.iter().any(|s| s.tier == tier)
    }

    pub fn plan_properties(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "cidr": self.cidr,
            "max_azs": self.max_azs,
            "nat_gateways": self.nat_gateways,
            "subnets": self.subnets,
        }))
    }

    pub fn synthesized_outputs(&self, id: &str, stack: &Stack) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "vpc_id".to_string(),
            format!("vpc-{}", pseudo_id(stack, id, "vpc", 17)),
        )])
    }
}
