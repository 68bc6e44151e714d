pub mod catalog_cache;
pub mod catalog_service;
pub mod frame_extractor;
pub mod object_keys;
pub mod object_store;
pub mod poster_service;
pub mod progress;
pub mod scratch;
pub mod thumbnail_service;
pub mod validation;
