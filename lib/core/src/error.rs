//! Result alias shared by the statusflow crates.
//!
//! Error types live next to the code that raises them (`GraphError`,
//! `SourceError`, `TransitionError` in the workflow crate). A lower layer's
//! report is wrapped with `.context()` when it crosses into the next layer,
//! so a `TransitionError` report still carries the `SourceError` beneath it.

use rootcause::Report;

/// `Result` whose error is a rootcause [`Report`] with context `C`.
///
/// `statusflow_core::Result<Node, SourceError>` reads as "a node, or a
/// report whose current context is a `SourceError`".
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
