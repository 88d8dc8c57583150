//! The directory server façade.
//!
//! # Module Organization
//!
//! * [`core`] - The [`DirectoryServer`] struct and runtime administration
//! * [`builder`] - [`DirectoryServerBuilder`] for assembling a server
//! * [`operations`] - Routing, execution and [`OperationResponse`]

pub mod builder;
pub mod core;
pub mod operations;

pub use builder::DirectoryServerBuilder;
pub use core::DirectoryServer;
pub use operations::OperationResponse;
