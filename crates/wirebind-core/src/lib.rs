//! Wirebind Core - shared types for optimistic replicas
//!
//! This crate holds everything a replica and its transport agree on, with no
//! replica state of its own:
//!
//! - [`MutationToken`] and the [`TokenSource`] implementations that mint them
//! - The [`Mutation`] wire model (`{"i": token, "m": {key: null | [value]}}`)
//!   and its JSON / DAG-CBOR codecs
//! - [`SyncMapConfig`] for token strategy and transport settings
//! - [`SyncError`], the unified error type

#![forbid(unsafe_code)]

/// Replica configuration
pub mod config;

/// Unified error handling
pub mod errors;

/// Mutation tokens and token sources
pub mod token;

/// Wire model and codecs
pub mod wire;

pub use config::{SyncMapConfig, TokenStrategy};
pub use errors::{Result, SyncError};
pub use token::{
    MutationToken, RandomTokenSource, SeededTokenSource, SequentialTokenSource, TokenSource,
};
pub use wire::{Change, InboundMutation, Mutation, OutboundMutation, WireFormat};
