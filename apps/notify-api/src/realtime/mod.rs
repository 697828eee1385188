pub mod events;
pub mod registry;
pub mod rooms;
pub mod server;
