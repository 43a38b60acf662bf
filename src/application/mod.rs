//! Application services layer.

pub mod detail;
pub mod error;
pub mod forms;
pub mod import;
pub mod listing;
pub mod mail;
pub mod pagination;
pub mod render;
pub mod repos;
pub mod search;
pub mod share;
pub mod site;
pub mod syndication;
