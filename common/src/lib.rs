pub mod config;
pub mod frame;
pub mod geometry;
pub mod params;
