pub mod actions;
pub mod audit;
pub mod classifier;
pub mod content;
pub mod decision;
pub mod results;
pub mod review_queue;
