// src/lib.rs

pub mod api;
pub mod cache;
pub mod db;
pub mod repositories;
pub mod services;
pub mod test_utils;

pub use db::Database;
pub use creditbook_common::error::{Error, ErrorKind};
