//! Vault file stores for Noteloom.
//!
//! All stores implement the `noteloom_core::FileStore` trait.
//!
//! - [`InMemoryFileStore`] announces every mutation itself.
//! - [`DiskFileStore`] reports changes through a `notify` watcher, so edits
//!   made by other programs are seen the same way as its own.

pub mod disk;
pub mod in_memory;

pub use disk::DiskFileStore;
pub use in_memory::InMemoryFileStore;
