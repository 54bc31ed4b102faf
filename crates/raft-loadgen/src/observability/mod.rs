//! Ambient logging concerns (C9), mirroring the node's tracing-based stack.

pub mod logging;
