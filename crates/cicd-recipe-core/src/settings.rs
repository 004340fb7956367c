//! Typed settings consumed by every stack definition.
//!
//! Built once at startup by the config loader and passed by reference to
//! each stack's `synthesize`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::naming;

/// Fully resolved inputs for synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application name recorded in the assembly manifest.
    pub app: String,
    /// Target account and region, when pinned.
    pub environment: Environment,
    /// Name or ARN of the secret the pipeline reads its token from.
    pub secret_id: String,
    /// Version-control access token written into the secret.
    pub github_oauth_token: Option<String>,
    /// Embed a placeholder instead of failing when the token is absent.
    pub allow_unresolved_token: bool,
    /// Repository fetched by the Source stage.
    pub source: SourceRepository,
    /// Stack and change set targeted by the Deploy stage.
    pub deploy: DeployTarget,
    /// Tags applied to every stack.
    pub tags: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: naming::app::NAME.to_string(),
            environment: Environment::default(),
            secret_id: naming::secret::NAME.to_string(),
            github_oauth_token: None,
            allow_unresolved_token: false,
            source: SourceRepository::default(),
            deploy: DeployTarget::default(),
            tags: BTreeMap::new(),
        }
    }
}

/// Account/region pair a stack is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    /// Environment URI in the form `aws://<account>/<region>`.
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRepository {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl Default for SourceRepository {
    fn default() -> Self {
        Self {
            owner: naming::source::OWNER.to_string(),
            repo: naming::source::REPO.to_string(),
            branch: naming::source::BRANCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTarget {
    pub stack_name: String,
    pub change_set_name: String,
    /// Template file expected inside the build artifact.
    pub template_file: String,
    /// Parameter/configuration file expected inside the build artifact.
    pub configuration_file: String,
}

impl Default for DeployTarget {
    fn default() -> Self {
        Self {
            stack_name: naming::deploy::TARGET_STACK.to_string(),
            change_set_name: naming::deploy::CHANGE_SET.to_string(),
            template_file: naming::deploy::TEMPLATE_FILE.to_string(),
            configuration_file: naming::deploy::CONFIGURATION_FILE.to_string(),
        }
    }
}
