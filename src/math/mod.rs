pub mod interpolate;
pub mod physics;
pub mod units;


pub use interpolate::*;
pub use physics::*;
pub use units::*;
