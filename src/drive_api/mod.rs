mod client;
mod download;
mod list;
pub mod types;

pub use client::DriveClient;
pub use list::{ListQuery, PageCursor};
