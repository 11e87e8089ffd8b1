//! Domain core of the karaoke queue engine.
//!
//! Pure types and decision logic with no storage or I/O dependencies:
//! presence facts, status resolution, eligibility, the autoplay walk and
//! reorder plan computation. Callers load data in bulk and pass it in.

pub mod autoplay;
pub mod eligibility;
pub mod error;
pub mod event;
pub mod presence;
pub mod queue;
pub mod reorder;
pub mod singer;
pub mod status;
pub mod types;
