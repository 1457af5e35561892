//! Zip archives in and out of the organizer.
//!
//! - [`extract`] unpacks an incoming project archive and reports which
//!   directory should be treated as the scan root.
//! - [`pack`] bundles the output directories of several projects into one
//!   archive, one top-level folder per project.
//!
//! Entry names that would escape the destination are refused rather than
//! sanitized.

pub mod error;
mod extract;
mod pack;

pub use crate::extract::extract;
pub use crate::pack::pack;
