pub mod cipher;
pub mod errors;
pub mod events;
pub mod mapping;
pub mod providers;
pub mod request;
pub mod results;
pub mod settings;
