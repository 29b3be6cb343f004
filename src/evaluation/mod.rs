//! Plant-state evaluation module.
//!
//! Maps sensor readings onto plant state:
//! - Reading validation (bounds, finiteness)
//! - Threshold classification
//! - Weighted health score
//! - Bounded transition history and statistics

pub mod evaluator;
pub mod reading;
pub mod score;
pub mod state;
pub mod thresholds;

pub use evaluator::*;
pub use reading::*;
pub use score::*;
pub use state::*;
pub use thresholds::*;
