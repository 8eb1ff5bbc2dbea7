pub mod ekf_2d;

pub use ekf_2d::{fuse_records, Ekf2d, Ekf2dState, FixOutcome};
