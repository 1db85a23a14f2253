//! Branch naming conventions.
//!
//! Branches follow `<kind><separator><discriminator>[#<issue id>]`, for example
//! `feature/login#42` or `release/2.0.0`. Classification is a literal prefix match,
//! nothing more.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trailing `#<id>` issue suffix; ids never start with `0`
static ISSUE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<head>.*)#(?P<issue>[1-9]\d*)$").expect("valid issue suffix regex")
});

/// The three branch families of the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Feature,
    Release,
    Hotfix,
}

impl BranchKind {
    /// All kinds, in classification order
    pub fn all() -> &'static [BranchKind] {
        &[BranchKind::Feature, BranchKind::Release, BranchKind::Hotfix]
    }

    /// Discriminator offered when the user does not type one
    pub fn default_discriminator(&self) -> &'static str {
        match self {
            BranchKind::Feature => "feature",
            BranchKind::Release => "0.1.0",
            BranchKind::Hotfix => "0.1.1",
        }
    }

    /// Prompt shown when asking for the discriminator
    pub fn discriminator_prompt(&self) -> &'static str {
        match self {
            BranchKind::Feature => "Enter new feature name (default \"feature\")",
            BranchKind::Release => "Enter new version tag (default \"0.1.0\")",
            BranchKind::Hotfix => "Enter new version hotfix (default \"0.1.1\")",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BranchKind::Feature => "feature",
            BranchKind::Release => "release",
            BranchKind::Hotfix => "hotfix",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "feature" | "feat" => Some(BranchKind::Feature),
            "release" => Some(BranchKind::Release),
            "hotfix" => Some(BranchKind::Hotfix),
            _ => None,
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix table and separator used to encode branch names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchNaming {
    pub separator: String,
    pub feature_prefix: String,
    pub release_prefix: String,
    pub hotfix_prefix: String,
}

impl Default for BranchNaming {
    fn default() -> Self {
        Self {
            separator: "/".to_string(),
            feature_prefix: "feature".to_string(),
            release_prefix: "release".to_string(),
            hotfix_prefix: "hotfix".to_string(),
        }
    }
}

/// A branch name decoded into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDescriptor {
    pub kind: BranchKind,
    pub discriminator: String,
    pub linked_issue_id: Option<u64>,
}

/// Result of [`BranchNaming::classify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Known(BranchDescriptor),
    /// No configured prefix matched
    Unknown,
}

impl Classification {
    pub fn descriptor(&self) -> Option<&BranchDescriptor> {
        match self {
            Classification::Known(descriptor) => Some(descriptor),
            Classification::Unknown => None,
        }
    }
}

impl BranchNaming {
    pub fn prefix(&self, kind: BranchKind) -> &str {
        match kind {
            BranchKind::Feature => &self.feature_prefix,
            BranchKind::Release => &self.release_prefix,
            BranchKind::Hotfix => &self.hotfix_prefix,
        }
    }

    /// Decode a branch name. The first kind whose `<prefix><separator>` starts the
    /// name wins.
    pub fn classify(&self, branch_name: &str) -> Classification {
        for kind in BranchKind::all() {
            let lead = format!("{}{}", self.prefix(*kind), self.separator);
            let Some(rest) = branch_name.strip_prefix(&lead) else {
                continue;
            };

            let (discriminator, linked_issue_id) = match ISSUE_SUFFIX.captures(rest) {
                Some(caps) => match caps["issue"].parse::<u64>() {
                    Ok(id) => (caps["head"].to_string(), Some(id)),
                    // Too many digits for an id: keep the name intact
                    Err(_) => (rest.to_string(), None),
                },
                None => (rest.to_string(), None),
            };

            return Classification::Known(BranchDescriptor {
                kind: *kind,
                discriminator,
                linked_issue_id,
            });
        }

        Classification::Unknown
    }

    /// Encode a branch name; inverse of [`classify`](Self::classify).
    pub fn compose(&self, kind: BranchKind, discriminator: &str, issue_id: Option<u64>) -> String {
        let mut name = format!("{}{}{}", self.prefix(kind), self.separator, discriminator);
        if let Some(id) = issue_id {
            name.push_str(&format!("#{}", id));
        }
        name
    }

    pub fn compose_descriptor(&self, descriptor: &BranchDescriptor) -> String {
        self.compose(
            descriptor.kind,
            &descriptor.discriminator,
            descriptor.linked_issue_id,
        )
    }
}
