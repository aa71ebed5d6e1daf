//! # Ownership
//!
//! Resource descriptors and the ownership graph resolver built on them.

pub mod descriptor;
pub mod resolver;

pub use descriptor::{
    descriptors, Dependent, DependentRows, HostPath, Hop, ResourceDescriptor, ResourceKind,
    ResourceRef, SharedLink,
};
pub use resolver::OwnershipResolver;
