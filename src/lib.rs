pub mod assemble;
pub mod config;
pub mod crs;
pub mod data_io;
pub mod derived;
pub mod logging;
pub mod math;
pub mod parallel;
pub mod pipeline;
pub mod regrid;
pub mod time_utils;
pub mod viewer;

pub use time_utils::*;
