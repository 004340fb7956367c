//! Cloud assembly manifest: what `synth` writes next to the templates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Result, SynthesizedStack};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1";

pub fn template_file_name(stack: &str) -> String {
    format!("{stack}.template.json")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub app: String,
    /// Stacks in deployment order.
    pub stacks: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub name: String,
    pub template_file: String,
    pub environment: String,
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Hex SHA-256 of the template file contents.
    pub digest: String,
}

impl Manifest {
    pub fn from_stacks(app: &str, stacks: &[SynthesizedStack]) -> Result<Self> {
        let entries = stacks
            .iter()
            .map(|s| -> Result<ManifestEntry> {
                Ok(ManifestEntry {
                    name: s.name.clone(),
                    template_file: template_file_name(&s.name),
                    environment: s.environment.clone(),
                    dependencies: s.dependencies.clone(),
                    tags: s.tags.clone(),
                    digest: s.template.digest()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: MANIFEST_VERSION.to_string(),
            app: app.to_string(),
            stacks: entries,
        })
    }

    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.stacks.iter().find(|e| e.name == name)
    }

    /// Carry over entries of `previous` for stacks that were not
    /// resynthesized. Entries are kept in `order`; names missing from it
    /// are dropped.
    pub fn merge(mut self, previous: &Manifest, order: &[&str]) -> Self {
        for entry in &previous.stacks {
            if self.entry(&entry.name).is_none() {
                self.stacks.push(entry.clone());
            }
        }

        let position = |name: &str| order.iter().position(|n| *n == name);
        self.stacks.retain(|e| position(e.name.as_str()).is_some());
        self.stacks.sort_by_key(|e| position(e.name.as_str()));
        self
    }
}

/// How a freshly synthesized stack relates to a previous assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackChange {
    Unchanged,
    Changed,
    New,
}

impl std::fmt::Display for StackChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackChange::Unchanged => write!(f, "unchanged"),
            StackChange::Changed => write!(f, "changed"),
            StackChange::New => write!(f, "new"),
        }
    }
}

/// Compare each stack of `current` with its entry in `previous` by digest.
pub fn compare(previous: Option<&Manifest>, current: &Manifest) -> Vec<(String, StackChange)> {
    current
        .stacks
        .iter()
        .map(|entry| {
            let change = match previous.and_then(|p| p.entry(&entry.name)) {
                None => StackChange::New,
                Some(old) if old.digest == entry.digest => StackChange::Unchanged,
                Some(_) => StackChange::Changed,
            };
            (entry.name.clone(), change)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{App, Settings, naming};

    fn manifest(settings: &Settings) -> Manifest {
        let stacks = App::recipe().synthesize(settings, &[]).unwrap();
        Manifest::from_stacks(&settings.app, &stacks).unwrap()
    }

    fn settings(token: &str) -> Settings {
        Settings {
            github_oauth_token: Some(token.to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_manifest_entries() {
        let manifest = manifest(&settings("tok-123"));
        assert_eq!(manifest.app, naming::app::NAME);
        assert_eq!(manifest.stacks.len(), 3);

        let pipeline = manifest.entry(naming::pipeline::STACK).unwrap();
        assert_eq!(pipeline.template_file, "LambdaCodePipelineStack.template.json");
        assert_eq!(pipeline.digest.len(), 64);
    }

    #[test]
    fn test_compare_detects_changes() {
        let before = manifest(&settings("tok-123"));
        let same = manifest(&settings("tok-123"));
        let changed = manifest(&settings("tok-456"));

        assert!(
            compare(Some(&before), &same)
                .iter()
                .all(|(_, c)| *c == StackChange::Unchanged)
        );

        let diff = compare(Some(&before), &changed);
        let secret = diff
            .iter()
            .find(|(n, _)| n == naming::secret::STACK)
            .unwrap();
        assert_eq!(secret.1, StackChange::Changed);
        let bucket = diff
            .iter()
            .find(|(n, _)| n == naming::artifact_bucket::STACK)
            .unwrap();
        assert_eq!(bucket.1, StackChange::Unchanged);

        assert!(compare(None, &same).iter().all(|(_, c)| *c == StackChange::New));
    }

    #[test]
    fn test_merge_keeps_untouched_stacks_in_order() {
        let full = manifest(&settings("tok-123"));
        let stacks = App::recipe()
            .synthesize(
                &settings("tok-456"),
                &[naming::secret::STACK.to_string()],
            )
            .unwrap();
        let partial = Manifest::from_stacks(naming::app::NAME, &stacks).unwrap();
        let order = App::recipe().deployment_names().unwrap();

        let merged = partial.merge(&full, &order);

        let names: Vec<_> = merged.stacks.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, order);
        assert_ne!(
            merged.entry(naming::secret::STACK).unwrap().digest,
            full.entry(naming::secret::STACK).unwrap().digest
        );
        assert_eq!(
            merged.entry(naming::pipeline::STACK),
            full.entry(naming::pipeline::STACK)
        );
    }

    #[test]
    fn test_merge_drops_unknown_stacks() {
        let mut previous = manifest(&settings("tok-123"));
        let mut stale = previous.stacks[0].clone();
        stale.name = "RetiredStack".to_string();
        previous.stacks.push(stale);

        let current = manifest(&settings("tok-123"));
        let order = App::recipe().deployment_names().unwrap();
        let merged = current.merge(&previous, &order);
        assert!(merged.entry("RetiredStack").is_none());
        assert_eq!(merged.stacks.len(), 3);
    }
}
