//! Client-side image asset uploader
//!
//! Runs the three-step upload handshake: fetch a signature from the trusted
//! backend, transfer the image to the CDN, then register the CDN asset with
//! the backend. Progress is reported on an ordered event channel while the
//! final asset is delivered separately.

pub mod backend;
pub mod cdn;
pub mod error;
pub mod models;
pub mod progress;
pub mod uploader;

pub use error::{Error, Result};
