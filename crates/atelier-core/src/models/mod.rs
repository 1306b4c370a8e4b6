//! Data models shared by the session core and its consumers.
//!
//! - `Profile`, `Role`: the user snapshot carried inside a credential
//! - `Access`, `AccessArea`: role checks for back-office areas

pub mod access;
pub mod profile;

pub use access::{check_access, home_route, Access, AccessArea};
pub use profile::{Profile, Role};
