//! Terminal output

pub mod actor;
pub mod progress;
pub mod reporter;

pub use reporter::TerminalReporter;
