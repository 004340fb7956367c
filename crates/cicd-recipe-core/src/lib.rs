//! Core domain types for the CI/CD recipe.
//!
//! This crate contains:
//! - Logical identifiers and the template document model
//! - Shared resource names
//! - Typed settings consumed by every stack
//! - The artifact bucket, secret and pipeline stack definitions
//! - App composition and deployment ordering
//! - Cloud assembly manifest types

pub mod app;
pub mod artifact;
pub mod assembly;
pub mod error;
pub mod iam;
pub mod id;
pub mod naming;
pub mod pipeline;
pub mod secret;
pub mod settings;
pub mod stack;
pub mod template;

pub use app::App;
pub use error::{Error, Result};
pub use id::LogicalId;
pub use settings::Settings;
pub use stack::{StackDefinition, SynthesizedStack};
pub use template::Template;
