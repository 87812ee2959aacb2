// crates/ps_algo/src/lib.rs
#![forbid(unsafe_code)]

// ----------------------------- Surplus redistribution --------------------------------

pub mod surplus;

pub use surplus::{
    redistribute, redistribute_linked, redistribute_nonzero, Bucket, BucketArena, BucketId,
    LinkedOutcome, LinkedTarget, Outcome, Resolution,
};

// Pass bounds live with the rest of the configuration in ps_core.
pub use surplus::{MAX_PASSES_LINKED, MAX_PASSES_PERCENT, MAX_PASSES_ROOMS, MAX_PASSES_SPECIAL};

// ----------------------------- Proportional splits -----------------------------------

pub mod split;

pub use split::{percent_shares, proportional_split, Share, SplitError};

// ----------------------------- Adjacent rooms ----------------------------------------

pub mod rooms;

pub use rooms::{allocate_rooms, MetricOutcome, ParentMetrics, RoomAllocation, RoomError, RoomInput, RoomValues};
