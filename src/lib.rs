pub mod cache;
pub mod config;
pub mod dates;
pub mod extract;
pub mod model;
pub mod store;
pub mod sync;
pub mod text;
