//! Pure domain logic for the Atelier generation engine.
//!
//! Theme documents and their wizard projection, theme editing modes, the
//! generation job model and the shared error taxonomy. Nothing in this
//! crate performs I/O.

pub mod error;
pub mod job;
pub mod mode;
pub mod theme;
pub mod types;
pub mod wizard;
