//! Active-torrent streaming cache: activates descriptors into live download
//! sessions on demand and serves their files as seekable HTTP resources.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod range;
pub mod registry;
pub mod server;
pub mod stream;
pub mod swarm;

pub use error::Error;
