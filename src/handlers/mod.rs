pub mod auth;
pub mod department;
pub mod notification;
pub mod project;
pub mod task;
pub mod user;
pub mod vendor;
