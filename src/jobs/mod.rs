pub mod moderation_worker;
