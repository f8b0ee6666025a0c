/*
[INPUT]:  Public API exports for the opsline-runner crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - session runner library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod recorder;
pub mod scenario;
pub mod session;

// Re-export main types for convenience
pub use recorder::DataRecorder;
pub use scenario::Scenario;
pub use session::{SessionManager, TaskCommand};
