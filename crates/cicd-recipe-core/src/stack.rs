//! The stack abstraction shared by every definition.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Result, Settings, Template};

/// A named, independently deployable unit of declared resources.
///
/// Implementations are pure: the same settings always yield the same template.
pub trait StackDefinition: Send + Sync {
    /// Stack name, also used for the template file name.
    fn name(&self) -> &'static str;

    /// Stacks that must be deployed before this one.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Produce the template for this stack.
    fn synthesize(&self, settings: &Settings) -> Result<Template>;
}

/// A stack after synthesis, with the metadata the assembly needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedStack {
    pub name: String,
    pub dependencies: Vec<String>,
    pub environment: String,
    pub tags: BTreeMap<String, String>,
    pub template: Template,
}
