//! Deployment targets: environments and the components deployed into them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::build::BuildCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Backend,
    Frontend,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::Backend, Component::Frontend];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] =
        [Environment::Dev, Environment::Staging, Environment::Production];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Category of the builds this environment deploys.
    pub fn build_category(self) -> BuildCategory {
        match self {
            Self::Dev => BuildCategory::DevTest,
            Self::Staging => BuildCategory::MainTest,
            Self::Production => BuildCategory::Production,
        }
    }

    /// Less-restricted environment whose builds production is compared against.
    pub fn reference(self) -> Option<Environment> {
        match self {
            Self::Production => Some(Self::Staging),
            Self::Dev | Self::Staging => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}
