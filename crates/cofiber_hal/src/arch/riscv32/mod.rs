pub mod context;
pub mod processor;
