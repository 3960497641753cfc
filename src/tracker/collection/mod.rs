pub mod host_input;
pub mod ticker;
