//! Disturbance-adjusted temporal aggregation

mod temporal;

pub use temporal::{disturbance_masked_mean, no_fire_mask, TemporalMean, YearFn, YearWindow, YearlyRasters};
