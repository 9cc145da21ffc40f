//! # petstore-core
//!
//! Core types for the Petstore MCP client.
//!
//! This crate provides:
//! - Client and server configuration
//! - Tool descriptors and invocation results
//! - Prompt template and sampling preset registries
//! - Common error types

pub mod config;
pub mod error;
pub mod invocation;
pub mod prompt;
pub mod sampling;
pub mod tool;

pub use config::{ClientConfig, LogLevel, ServerConfig};
pub use error::{Error, Result, ValidationError};
pub use invocation::{ErrorDescriptor, InvocationResult};
pub use prompt::{PromptRegistry, PromptTemplate, RenderedPrompt};
pub use sampling::{SamplingConfig, SamplingRegistry};
pub use tool::{FieldSchema, InvocationRequest, ToolDescriptor};
