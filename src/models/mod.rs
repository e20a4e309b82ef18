pub mod manifest;
pub mod settings;
pub mod snapshot;
