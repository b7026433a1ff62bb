//! Client for the long-lived reflection worker.
//!
//! The worker answers supplementary editor queries (hover, definition,
//! call-argument hints, rename) over newline-delimited JSON records on its
//! stdin/stdout. [`BridgeClient`] owns the worker process, starts it lazily,
//! correlates responses with requests by id and bounds every request with a
//! timeout. Every failure resolves to an absent result.

pub mod codec;
pub mod protocol;

mod client;
mod state;

pub use client::{BridgeClient, BridgeSettings, DEFAULT_REQUEST_TIMEOUT};
pub use protocol::{
    CallArgumentHint, Capability, DefinitionLocation, FeatureRequest, FeatureResult, HoverInfo,
    PROTOCOL_VERSION, RenameEdit,
};
pub use state::{BridgeCore, WorkerEvent, WorkerStatus};
