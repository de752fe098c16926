pub mod job;
pub mod thumbnail;
