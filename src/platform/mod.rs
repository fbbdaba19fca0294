//! Platform Adapter Module
//!
//! The chat platform is an external collaborator. The core only sees it
//! through `PlatformClient`: membership snapshots, actor authority and the
//! revoke action.

pub mod mock;
pub mod traits;

pub use mock::{InMemoryPlatform, Revocation};
pub use traits::{
    ActorPermissions, Membership, PlatformClient, PlatformError, PlatformResult, RoleId, SubjectId,
};
