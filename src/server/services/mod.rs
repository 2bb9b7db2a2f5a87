pub mod chat;
pub mod group_registry;
pub mod identity;
pub mod message_store;
