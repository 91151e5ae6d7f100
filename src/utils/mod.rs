pub mod delay;
pub mod logging;

pub use delay::DelayRange;
