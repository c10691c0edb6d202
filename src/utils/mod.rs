pub mod coordinate_conversion;
pub mod logging;
pub mod projection;
