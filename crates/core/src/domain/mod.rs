pub mod niche;
pub mod report;
