pub mod courier;
pub mod order;
pub mod stats;
