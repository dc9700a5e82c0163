pub mod backfill;
pub mod backup;
pub mod order;
pub mod predict;
pub mod review;
pub mod status;
