//! rusty-forum/crates/rf-services/src/lib.rs
//!
//! Domain services over the rf-core ports: the post hierarchy manager, the
//! voting protocol surface, the viewer-vote projection, the listing order
//! policy and the ownership guard, plus account management.

pub mod guard;
pub mod ordering;
pub mod posts;
pub mod projection;
pub mod users;

pub use posts::PostService;
pub use users::UserService;
