//! Control core: decision engine, timing guards, feature overrides and
//! the adaptive hysteresis band.

pub mod decision;
pub mod features;
pub mod hysteresis;
pub mod switch;
