//! The four resource bindings driven by [`crate::bulk::BulkLoop`].
//!
//! Each binding only says how to list one page and how to undo one item.
//! Pagination, retries and archival are the loop's job.

pub mod follows;
pub mod likes;
pub mod lists;
pub mod tweets;

pub use follows::FollowsOp;
pub use likes::LikesOp;
pub use lists::{ListMembersOp, ListsOp};
pub use tweets::TweetsOp;
