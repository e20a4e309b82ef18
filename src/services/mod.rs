pub mod backup;
pub mod chain;
pub mod changes;
pub mod reload;
pub mod restore;
pub mod retention;
pub mod scheduler;
pub mod settings_store;
pub mod snapshot_index;
