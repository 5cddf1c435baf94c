pub mod audit;
pub mod moderation;
pub mod post;
pub mod review;
