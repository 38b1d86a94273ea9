//! Core domain models and pure sync logic for the gridnode worker.

pub mod sync;
