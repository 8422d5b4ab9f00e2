//! Weaver image build functionality
//!
//! Turns a language/command/environment triple into a runnable image tag:
//! Dockerfile generation, in-memory build context creation, and image
//! building against the Docker Engine.

pub mod builder;
pub mod context;
pub mod dockerfile;
pub mod error;

pub use builder::{DockerImageBuilder, ImageBuilder};
pub use context::ContextBuilder;
pub use dockerfile::{LanguageSpec, generate_dockerfile};
pub use error::{BuildError, BuildResult};
