//! Tag query parsing and search resolution for an image catalog.

pub mod config;
pub mod db;
pub mod export;
pub mod hashing;
pub mod logging;
pub mod search;
