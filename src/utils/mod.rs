pub mod archive;
pub mod auth;
pub mod authorize;
pub mod command;
pub mod cron;
pub mod drive;
pub mod locker;
pub mod retry;

// Trait-based abstractions for testability
pub mod executor;
pub mod drive_ops;

// Re-export commonly used types and traits (used by test crate)
#[allow(unused_imports)]
pub use executor::{CommandExecutor, RealExecutor};
#[allow(unused_imports)]
pub use drive_ops::{DriveError, EntryFilter, EntryKind, RemoteEntry, RemoteStore};
#[allow(unused_imports)]
pub use drive::DriveClient;
