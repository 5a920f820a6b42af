pub mod catalog;
pub mod events;
pub mod media;
pub mod preferences;
pub mod random;
pub mod storage;
