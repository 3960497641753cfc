//! Tracks how long the active browser tab stays on sites you chose to follow, and groups that time
//! into projects. The browser talks to a small host process over stdin; everything it learns is
//! kept in a single JSON file that the command line front end reads and edits.
//!

pub mod cli;
pub mod fs;
pub mod matcher;
pub mod store;
pub mod tracker;
pub mod utils;
