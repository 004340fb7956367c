//! Fixed identifiers shared between stack definitions.
//!
//! Stacks are coupled by these names rather than by object references, so
//! each definition imports the names it needs from here.

/// Application-wide names.
pub mod app {
    pub const NAME: &str = "aws-cicd-recipe";
}

/// The artifact store.
pub mod artifact_bucket {
    pub const STACK: &str = "ArtifactBucketStack";
    pub const NAME: &str = "aws-ci-cd-recipe-artifact-bucket";
}

/// The secret holding the version-control credential.
pub mod secret {
    pub const STACK: &str = "SecretsManagerStack";
    pub const NAME: &str = "AwsCicdRecipe";
    pub const TOKEN_FIELD: &str = "GITHUB_OAUTH_TOKEN";
    /// Value embedded when the token is absent and placeholders are allowed.
    pub const UNRESOLVED_TOKEN: &str = "undefined";
}

/// The delivery pipeline and its build project.
pub mod pipeline {
    pub const STACK: &str = "LambdaCodePipelineStack";
    pub const NAME: &str = "LambdaCodePipeline";
    pub const BUILD_PROJECT: &str = "LambdaProject";
    pub const BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:5.0";
    pub const SOURCE_ARTIFACT: &str = "source";
    pub const BUILD_ARTIFACT: &str = "build";
}

/// Remote repository fetched by the Source stage.
pub mod source {
    pub const OWNER: &str = "Tomoaki-Moriya";
    pub const REPO: &str = "html-to-pdf-lambda";
    pub const BRANCH: &str = "main";
}

/// Target of the Deploy stage and the files the build must produce.
pub mod deploy {
    pub const TARGET_STACK: &str = "HtmlToPdfLambdaStack";
    pub const CHANGE_SET: &str = "HtmlToPdfLambdaStackChangeSet";
    pub const TEMPLATE_FILE: &str = "build.yaml";
    pub const CONFIGURATION_FILE: &str = "param.json";
}

/// Keys accepted by the context lookup.
pub mod context {
    pub const SECRET_ID: &str = "SECRET_ID";
    pub const GITHUB_OAUTH_TOKEN: &str = "GITHUB_OAUTH_TOKEN";

    pub const KNOWN_KEYS: &[&str] = &[SECRET_ID, GITHUB_OAUTH_TOKEN];
}
