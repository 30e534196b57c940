//! Library components of the docvault CLI.

pub mod logging;
