pub mod matching;
pub mod scheduler;
pub mod stats;
