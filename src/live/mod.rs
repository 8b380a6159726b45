mod hub;

pub use hub::{BroadcastHub, Listener, ListenerId};
