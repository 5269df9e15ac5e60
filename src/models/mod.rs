pub mod journal;
pub mod paper;

pub use journal::*;
pub use paper::*;
