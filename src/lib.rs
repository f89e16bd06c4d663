//! par1rs - PAR v1.0 parity archive creation, verification, and repair
//!
//! A parity archive protects a set of data files with Reed-Solomon
//! recovery volumes over GF(2^8): any M missing files can be rebuilt
//! bit-exactly from the survivors plus any M intact volumes.
//!
//! The crate is organized around a [`session::ParSession`], which owns
//! the directory index and the current file/volume lists and exposes
//! the operations the CLI and the interactive interface dispatch to.
//! Underneath sit the Galois field tables ([`galois`]), the coding
//! matrix solver ([`matrix`]), the block-streaming codec ([`codec`]),
//! and the archive format layer ([`format`], including the read-only
//! legacy v0.x reader).

pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod fileio;
pub mod format;
pub mod galois;
pub mod index;
pub mod matrix;
pub mod reconcile;
pub mod reporters;
pub mod restore;
pub mod session;
pub mod ui;
pub mod unicode;

pub use config::Config;
pub use error::{ParError, Result};
pub use session::{ParSession, SetStatus};
