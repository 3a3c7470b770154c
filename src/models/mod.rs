//! # Models
//!
//! The submission row as seen by the registration core. The surrounding
//! application owns the submission; this crate reads its gating fields and
//! mutates only the registration bookkeeping.

pub mod submission;

pub use submission::{BackendSelection, CosignState, PaymentState, Submission};
