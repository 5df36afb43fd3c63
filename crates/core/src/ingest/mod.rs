pub mod error;
pub mod retry;
pub mod trends;
pub mod types;
pub mod youtube;
