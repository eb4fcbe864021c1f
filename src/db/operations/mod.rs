pub mod activity;
pub mod auth_session;
pub mod group;
pub mod user;

pub use activity::*;
pub use auth_session::*;
pub use group::*;
pub use user::*;
