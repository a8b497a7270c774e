pub mod config;
pub mod info;
pub mod params;
pub mod pipeline;
pub mod select;
pub mod trim;
