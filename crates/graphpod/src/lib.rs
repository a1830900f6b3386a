//! A sandboxed Python agent runtime behind a worker-style message channel.
//!
//! The worker boots an embedded interpreter through a fixed sequence of
//! bootstrap stages, installs a graph-based agent framework fetched from a
//! package registry, and bridges `call_llm` invocations from sandboxed code
//! out to an HTTP language-model backend.

pub mod bootstrap;
pub mod bridge;
pub mod config;
pub mod install;
pub mod logger;
pub mod protocol;
pub mod sandbox;
pub mod worker;

#[cfg(test)]
pub(crate) mod testsupport;
