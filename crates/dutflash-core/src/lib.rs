//! dutflash-core - Core types and collaborator traits for device flashing
//!
//! This crate provides the data model shared by the flash orchestrator and
//! the abstractions for everything it talks to (build resolution, the device
//! under test, the property store, tracking and history files). It does no
//! I/O itself.

pub mod collaborators;
pub mod error;
pub mod models;

pub use collaborators::{
    AttemptRequest, BuildResolver, BuildTracker, CommandHistory, DeviceHandle, PropertySink,
    VersionSession,
};
pub use error::{CollaboratorError, CollaboratorResult, RequestError};
pub use models::*;
