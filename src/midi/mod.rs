pub mod bytes;
pub mod diagnostics;
pub mod events;
pub mod instrument;
pub mod key_signature;
pub mod loader;
pub mod time_signature;
pub mod track_data;
pub mod writer;
