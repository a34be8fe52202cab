pub mod events;
pub mod offline;
pub mod storage;
