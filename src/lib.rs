//! Libris application library
//!
//! Catalog, loan-selection and loan-ledger modules plus the bootstrap that
//! wires them into the platform crates.

pub mod bootstrap;
pub mod error;
pub mod modules;
pub mod session;
pub mod state;
pub mod utils;

pub use error::LibraryError;
pub use state::AppState;
