// File: creditbook-common/src/lib.rs
//
// Types shared by every creditbook crate: models, the error type, the
// storage traits and the FIFO lot arithmetic.

pub mod error;
pub mod fifo;
pub mod models;
pub mod traits;

pub use error::{Error, ErrorKind};
