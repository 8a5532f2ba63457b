// HTTP surface for the streaming cache.

pub mod handler;
