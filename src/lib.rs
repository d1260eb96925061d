pub mod capture;
pub mod config;
pub mod gait;
pub mod pose;
