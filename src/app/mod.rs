pub mod auth;
pub mod comments;
pub mod groups;
pub mod media;
pub mod pagination;
pub mod posts;
pub mod social;
pub mod users;
