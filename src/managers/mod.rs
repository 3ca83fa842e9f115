pub mod backup;
pub mod logging;
pub mod retention;
pub mod scheduler;
