pub mod inspection_gateway;
pub mod key_value_store;
pub mod sync_events;

pub use inspection_gateway::{InspectionGateway, RemotePayload, TransportError};
pub use key_value_store::KeyValueStore;
pub use sync_events::{SyncEvent, SyncEventSink};
