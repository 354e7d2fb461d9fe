//! Upload storage backends.
//!
//! The [`backend::ObjectStorage`] trait abstracts over where uploaded
//! bytes live.  Implementations: an in-memory map and Google Cloud Storage.

pub mod backend;
pub mod gcs;
pub mod memory;
