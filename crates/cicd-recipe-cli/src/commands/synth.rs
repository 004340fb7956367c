//! Synth command: write templates and the assembly manifest.

use anyhow::{Context, Result};
use cicd_recipe_core::assembly::{MANIFEST_FILE, Manifest, template_file_name};
use cicd_recipe_core::{App, Settings, SynthesizedStack};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub fn run(settings: &Settings, out: &str, stacks: &[String]) -> Result<()> {
    let manifest = synthesize_into(settings, Path::new(out), stacks)?;

    for entry in &manifest.stacks {
        if stacks.is_empty() || stacks.contains(&entry.name) {
            println!("{} -> {}/{}", entry.name, out, entry.template_file);
        }
    }
    Ok(())
}

/// Synthesize the selected stacks (all when `only` is empty) into
/// `out_dir`. A partial run keeps the manifest entries of the stacks it
/// did not touch.
pub fn synthesize_into(settings: &Settings, out_dir: &Path, only: &[String]) -> Result<Manifest> {
    let app = App::recipe();
    let synthesized = app
        .synthesize(settings, only)
        .context("Synthesis failed")?;

    let mut manifest = Manifest::from_stacks(&settings.app, &synthesized)?;
    if !only.is_empty() {
        if let Some(previous) = read_manifest(out_dir)? {
            debug!(stacks = ?only, "Merging into existing manifest");
            manifest = manifest.merge(&previous, &app.deployment_names()?);
        }
    }

    write_assembly(out_dir, &synthesized, &manifest)?;
    Ok(manifest)
}

/// Write one template per stack and the manifest into `out_dir`.
pub fn write_assembly(
    out_dir: &Path,
    stacks: &[SynthesizedStack],
    manifest: &Manifest,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for stack in stacks {
        let path = out_dir.join(template_file_name(&stack.name));
        let body = stack.template.to_json_pretty()?;
        fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(stack = %stack.name, path = %path.display(), "Wrote template");
    }

    let path = out_dir.join(MANIFEST_FILE);
    fs::write(&path, serde_json::to_string_pretty(manifest)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(
        out = %out_dir.display(),
        written = stacks.len(),
        stacks = manifest.stacks.len(),
        "Wrote cloud assembly"
    );
    Ok(())
}

/// The manifest in `out_dir`, if one was written before.
pub fn read_manifest(out_dir: &Path) -> Result<Option<Manifest>> {
    let path = out_dir.join(MANIFEST_FILE);
    if !path.exists() {
        debug!(path = %path.display(), "No previous manifest");
        return Ok(None);
    }

    let body =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let manifest = serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cicd_recipe_core::naming;

    fn settings(token: &str) -> Settings {
        Settings {
            github_oauth_token: Some(token.to_string()),
            ..Settings::default()
        }
    }

    fn only(name: &str) -> Vec<String> {
        vec![name.to_string()]
    }

    #[test]
    fn test_write_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = synthesize_into(&settings("tok-123"), dir.path(), &[]).unwrap();

        let names: Vec<_> = manifest.stacks.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                naming::secret::STACK,
                naming::artifact_bucket::STACK,
                naming::pipeline::STACK,
            ]
        );

        for entry in &manifest.stacks {
            let body = fs::read_to_string(dir.path().join(&entry.template_file)).unwrap();
            let template: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert!(template["Resources"].is_object());
        }

        assert_eq!(read_manifest(dir.path()).unwrap(), Some(manifest));
    }

    #[test]
    fn test_write_selected_stack() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = synthesize_into(
            &settings("tok-123"),
            dir.path(),
            &only(naming::artifact_bucket::STACK),
        )
        .unwrap();

        assert_eq!(manifest.stacks.len(), 1);
        assert!(dir.path().join("ArtifactBucketStack.template.json").exists());
        assert!(!dir.path().join("SecretsManagerStack.template.json").exists());
    }

    #[test]
    fn test_selected_stack_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();

        assert!(synthesize_into(&settings, dir.path(), &only(naming::pipeline::STACK)).is_ok());
        assert!(synthesize_into(&settings, dir.path(), &[]).is_err());
    }

    #[test]
    fn test_partial_synth_keeps_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let full = synthesize_into(&settings("tok-123"), dir.path(), &[]).unwrap();

        let partial = synthesize_into(
            &settings("tok-123"),
            dir.path(),
            &only(naming::artifact_bucket::STACK),
        )
        .unwrap();

        assert_eq!(partial, full);
        assert_eq!(read_manifest(dir.path()).unwrap(), Some(full));
    }

    #[test]
    fn test_creates_nested_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("cdk.out");

        synthesize_into(&settings("tok-123"), &out, &[]).unwrap();
        assert!(out.join(MANIFEST_FILE).exists());
    }
}
