pub mod chat;
pub mod messages;
pub mod presence;
