//! Agent Runtime - orchestration over the Blueprint domain
//!
//! This crate turns validated Blueprints and stored entities into running
//! behaviour:
//! - Keeps the tool catalog and invokes tools on the function host
//! - Compiles Blueprint entries into hosted assistants or local agents
//! - Drives conversation runs against the hosted assistant backend
//! - Triggers workflows and executes their steps in the background
//!
//! # Architecture
//!
//! Front ends parse a [`commands::Command`] and hand it to the
//! [`commands::Dispatcher`]. Services talk to storage through the
//! `agentforge_db` repository traits and to the network through
//! [`backend::AssistantBackend`], [`llm::ChatModel`] and
//! [`functions::FunctionInvoker`], so every seam can be faked in tests.
//!
//! # Key Types
//!
//! - `AgentRuntime` - wires every service over one pool (see `runtime`)
//! - `ConversationRunner` - the polling run loop (see `conversation`)
//! - `WorkflowService` - trigger, dispatch and execution tracking
//!
//! # Credentials
//!
//! Commands that need the hosted backend or the function host fail with a
//! configuration error before doing any work when the credential is absent.

pub mod backend;
pub mod commands;
pub mod compiler;
pub mod conversation;
pub mod entities;
pub mod events;
pub mod executor;
pub mod functions;
pub mod llm;
pub mod platform;
pub mod registry;
pub mod runtime;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use commands::{Command, Dispatcher};
pub use runtime::AgentRuntime;
