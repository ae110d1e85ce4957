//! Branch-scoped mutation model.
//!
//! A write travels through [`PermissionGate`] (is the user in the project's
//! space?), [`BranchResolver`] (which branch is targeted?),
//! [`BranchMutabilityPolicy`] (does that branch accept writes from this
//! user?) and [`MutationKeyspace`] (is the key free in that scope?) before
//! reaching the store. [`BranchForker`] snapshots a scope into a new branch.
//! [`BranchingService`] exposes the resulting operations.

mod forker;
mod gate;
mod keyspace;
mod policy;
mod resolver;
mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use forker::{BranchForker, copy_mutations};
pub use gate::PermissionGate;
pub use keyspace::{MAX_PAGE_SIZE, MutationKeyspace};
pub use policy::{BranchMutabilityPolicy, Decision, Denial, decide};
pub use resolver::BranchResolver;
pub use service::{BranchingService, MutationUpdate, NewMutation, ValueUpdate};
