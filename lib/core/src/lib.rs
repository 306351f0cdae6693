//! Core domain types and utilities for statusflow.
//!
//! This crate provides the identifier types and error handling shared by the
//! workflow engine and the applications that embed it.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{NodeId, NodeRef, ParseIdError, SEPARATOR, WorkflowId};
