//! Diff command: compare a fresh synthesis with an existing assembly.

use anyhow::{Context, Result};
use cicd_recipe_core::assembly::{self, Manifest, StackChange};
use cicd_recipe_core::{App, Settings};
use std::path::Path;

use super::synth::read_manifest;

pub fn run(settings: &Settings, out: &str, stacks: &[String]) -> Result<()> {
    let changes = changes(settings, Path::new(out), stacks)?;

    let mut pending = 0;
    for (name, change) in &changes {
        println!("{:<28} {}", name, change);
        if *change != StackChange::Unchanged {
            pending += 1;
        }
    }

    if pending == 0 {
        println!("No changes");
    } else {
        println!("{} of {} stacks differ", pending, changes.len());
    }
    Ok(())
}

/// Per-stack changes between `out_dir` and what would be synthesized now.
pub fn changes(
    settings: &Settings,
    out_dir: &Path,
    stacks: &[String],
) -> Result<Vec<(String, StackChange)>> {
    let previous = read_manifest(out_dir)?;
    let synthesized = App::recipe()
        .synthesize(settings, stacks)
        .context("Synthesis failed")?;
    let current = Manifest::from_stacks(&settings.app, &synthesized)?;

    Ok(assembly::compare(previous.as_ref(), &current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::synth::synthesize_into;
    use cicd_recipe_core::assembly::MANIFEST_FILE;
    use cicd_recipe_core::naming;
    use std::fs;

    fn settings(token: &str) -> Settings {
        Settings {
            github_oauth_token: Some(token.to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_everything_new_without_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let changes = changes(&settings("tok-123"), dir.path(), &[]).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|(_, c)| *c == StackChange::New));
    }

    #[test]
    fn test_no_changes_after_synth() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings("tok-123");
        synthesize_into(&settings, dir.path(), &[]).unwrap();

        let changes = changes(&settings, dir.path(), &[]).unwrap();
        assert!(changes.iter().all(|(_, c)| *c == StackChange::Unchanged));
    }

    #[test]
    fn test_no_changes_after_partial_synth() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings("tok-123");
        synthesize_into(&settings, dir.path(), &[]).unwrap();
        synthesize_into(
            &settings,
            dir.path(),
            &[naming::artifact_bucket::STACK.to_string()],
        )
        .unwrap();

        let changes = changes(&settings, dir.path(), &[]).unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|(_, c)| *c == StackChange::Unchanged));
    }

    #[test]
    fn test_changed_token_changes_secret_only() {
        let dir = tempfile::tempdir().unwrap();
        synthesize_into(&settings("tok-123"), dir.path(), &[]).unwrap();

        let changes = changes(&settings("tok-456"), dir.path(), &[]).unwrap();
        for (name, change) in changes {
            let expected = if name == naming::secret::STACK {
                StackChange::Changed
            } else {
                StackChange::Unchanged
            };
            assert_eq!(change, expected, "stack {name}");
        }
    }

    #[test]
    fn test_corrupt_manifest_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "not json").unwrap();
        assert!(changes(&settings("tok-123"), dir.path(), &[]).is_err());
    }
}
