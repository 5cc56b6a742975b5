pub mod invalidation;
pub mod user;
pub mod workspace;

pub use invalidation::InvalidationRecord;
pub use user::{Identity, Profile, ProfileInput};
pub use workspace::{Invitation, Membership, Role, Workspace, WorkspaceInput};
