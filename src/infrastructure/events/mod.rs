pub mod broadcast_sink;

pub use broadcast_sink::BroadcastSyncEventSink;
