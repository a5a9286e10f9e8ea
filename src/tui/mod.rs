//! TUI module for terminal user interfaces

mod key_checker;

pub use key_checker::KeyCheckerApp;
