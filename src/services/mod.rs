pub mod auth;
pub mod generation;
pub mod images;
pub mod prompt;
pub mod queue;
pub mod recovery;
pub mod worker;
