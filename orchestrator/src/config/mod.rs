//! Configuration: settings file, application description and params

pub mod application;
pub mod params;
pub mod settings;
