//! # petstore-agent
//!
//! Agent-facing layer of the Petstore client.
//!
//! This crate provides:
//! - Typed Petstore records
//! - A domain client with one validated method per tool
//! - Task requests parsed from keyword arguments
//! - A task router that also serves prompts and sampling presets

pub mod client;
pub mod error;
pub mod models;
pub mod router;
pub mod tasks;

pub use client::PetstoreClient;
pub use error::{AgentError, AgentResult};
pub use models::{
    Category, Inventory, Order, OrderStatus, Pet, PetStatus, StoreSummary, Tag, User,
};
pub use router::{CompletionRequest, TaskResponse, TaskRouter};
pub use tasks::{OrderAction, PetAction, TaskRequest, UserAction, TASK_NAMES};
