//! Scenario ensemble aggregation
//!
//! - **reduce**: per-pixel median and second-lowest/second-highest ranks
//! - **change**: differences, 9-class transitions, attribution, agreement

mod change;
mod reduce;

pub use change::{
    agreement_counts, attribute_cell, attribution, difference, transition, transition_code, Agreement,
    Attribution, CoreComponents, TRANSITION_CODES,
};
pub use reduce::{low_high_fractiles, reduce_members, EnsembleStatistics};
