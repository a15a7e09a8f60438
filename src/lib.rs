pub mod camera;
pub mod cli;
pub mod config;
pub mod geometry;
pub mod playback;
pub mod pose;
pub mod render;
pub mod sender;
pub mod tracker;
