//! Git synchronisation with debouncing
//!
//! - [`EventDebouncer`] turns a burst of filesystem events into one deadline
//! - [`SyncCoordinator`] runs fetch → merge → add → commit → push

mod coordinator;
mod debounce;

pub use coordinator::{
    is_git_metadata, PipelineSettings, PushHook, SyncCoordinator, SyncState, TaskReport,
};
pub use debounce::EventDebouncer;
