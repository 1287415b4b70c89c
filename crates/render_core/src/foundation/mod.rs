//! Foundation module - logging setup and math types shared by the renderer

pub mod logging;
pub mod math;
