//! Microsoft Graph access
//!
//! - [`client`] — endpoint, bearer tokens and the shared [`RequestExecutor`](crate::retry::RequestExecutor)
//! - [`history`] — paginated chat/channel/thread history retrieval
//! - [`drive`] — direct and chunked uploads into OneDrive/SharePoint drives

pub mod client;
pub mod drive;
pub mod history;

pub use client::{GraphClient, StaticToken, TokenProvider};
pub use drive::DriveUploader;
pub use history::HistoryFetcher;
