//! Ambient logging and request-tracking concerns (C9), carried over from
//! the node's tracing-based stack regardless of which domain features a
//! given spec scopes out.

pub mod logging;
pub mod middleware;
