mod branch_ref;
mod models;
mod role;

pub use branch_ref::{BranchRef, RESERVED_BRANCH_NAMES, is_reserved_branch_name};
pub use models::*;
pub use role::Role;
