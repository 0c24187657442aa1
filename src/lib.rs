//! Mail Ingest: forwards actionable Gmail messages to a LangGraph agent.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod schedule;
pub mod store;
