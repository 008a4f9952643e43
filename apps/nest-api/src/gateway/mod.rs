pub mod events;
pub mod fanout;
pub mod hub;
pub mod outbox;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod server;
