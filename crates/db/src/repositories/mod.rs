//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool`, or `&mut Transaction` for steps that must commit
//! together with the queue version bump.

pub mod attendance_repo;
pub mod event_repo;
pub mod queue_entry_repo;
pub mod singer_status_repo;
pub mod user_repo;

pub use attendance_repo::AttendanceRepo;
pub use event_repo::EventRepo;
pub use queue_entry_repo::QueueEntryRepo;
pub use singer_status_repo::SingerStatusRepo;
pub use user_repo::UserRepo;
