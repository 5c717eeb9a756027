pub mod agent;
pub mod assistant;
pub mod conversation;
pub mod events;
pub mod execution;
pub mod tool;
pub mod workflow;
