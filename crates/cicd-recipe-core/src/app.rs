//! App composition: the set of stacks and the order they deploy in.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::artifact::ArtifactBucketStack;
use crate::pipeline::PipelineStack;
use crate::secret::SecretsManagerStack;
use crate::stack::{StackDefinition, SynthesizedStack};
use crate::{Error, Result, Settings};

/// An ordered collection of stack definitions.
#[derive(Default)]
pub struct App {
    stacks: Vec<Box<dyn StackDefinition>>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recipe: pipeline, artifact bucket and secret stacks.
    pub fn recipe() -> Self {
        Self {
            stacks: vec![
                Box::new(PipelineStack),
                Box::new(ArtifactBucketStack),
                Box::new(SecretsManagerStack),
            ],
        }
    }

    pub fn add_stack(&mut self, stack: impl StackDefinition + 'static) -> Result<()> {
        if self.stack(stack.name()).is_some() {
            return Err(Error::Duplicate(format!("stack '{}'", stack.name())));
        }
        self.stacks.push(Box::new(stack));
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&dyn StackDefinition> {
        self.stacks
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Stacks ordered so every stack follows its dependencies. Ties keep
    /// declaration order.
    pub fn deployment_order(&self) -> Result<Vec<&dyn StackDefinition>> {
        let by_name: HashMap<&str, &dyn StackDefinition> = self
            .stacks
            .iter()
            .map(|s| (s.name(), s.as_ref()))
            .collect();

        for stack in &self.stacks {
            for dep in stack.dependencies() {
                if !by_name.contains_key(dep) {
                    return Err(Error::UnknownStack(format!(
                        "'{}' depends on '{}'",
                        stack.name(),
                        dep
                    )));
                }
            }
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.stacks.len());
        for stack in &self.stacks {
            visit(stack.as_ref(), &by_name, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    /// Stack names in deployment order.
    pub fn deployment_names(&self) -> Result<Vec<&'static str>> {
        Ok(self.deployment_order()?.iter().map(|s| s.name()).collect())
    }

    /// Synthesize the selected stacks (all when `only` is empty) in
    /// deployment order.
    pub fn synthesize(&self, settings: &Settings, only: &[String]) -> Result<Vec<SynthesizedStack>> {
        for name in only {
            if self.stack(name).is_none() {
                return Err(Error::UnknownStack(name.clone()));
            }
        }

        let environment = settings.environment.uri();
        let mut synthesized = Vec::new();
        for stack in self.deployment_order()? {
            if !only.is_empty() && !only.iter().any(|n| n == stack.name()) {
                debug!(stack = stack.name(), "Skipping unselected stack");
                continue;
            }

            let template = stack.synthesize(settings)?;
            info!(
                stack = stack.name(),
                resources = template.resources.len(),
                "Synthesized stack"
            );
            synthesized.push(SynthesizedStack {
                name: stack.name().to_string(),
                dependencies: stack.dependencies().iter().map(|d| d.to_string()).collect(),
                environment: environment.clone(),
                tags: settings.tags.clone(),
                template,
            });
        }
        Ok(synthesized)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Depth-first post-order visit; re-entering an in-progress stack is a cycle.
fn visit<'a>(
    stack: &'a dyn StackDefinition,
    by_name: &HashMap<&'a str, &'a dyn StackDefinition>,
    marks: &mut HashMap<&'a str, Mark>,
    order: &mut Vec<&'a dyn StackDefinition>,
) -> Result<()> {
    match marks.get(stack.name()) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            return Err(Error::CycleDetected(stack.name().to_string()));
        }
        None => {}
    }

    marks.insert(stack.name(), Mark::InProgress);
    for dep in stack.dependencies() {
        let dep_stack = by_name[dep];
        visit(dep_stack, by_name, marks, order).map_err(|e| match e {
            Error::CycleDetected(path) => {
                Error::CycleDetected(format!("{} -> {}", stack.name(), path))
            }
            other => other,
        })?;
    }
    marks.insert(stack.name(), Mark::Done);
    order.push(stack);
    Ok(())
}
