pub mod admin;
pub mod auth;
pub mod error;
pub mod images;
pub mod inbox;
pub mod items;
pub mod middleware;
mod util;
