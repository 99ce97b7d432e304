//! Turning editor signals into heartbeats.

pub mod builder;
pub mod classifier;
pub mod debounce;
pub mod dedup;
pub mod lines;
pub mod surfaces;

pub use builder::{build_heartbeat, category_for, ActivityFlags, EmitSnapshot};
pub use classifier::{AuthorshipClassifier, ChangeShape};
pub use debounce::SettleDebouncer;
pub use dedup::{DedupGuard, FileSelection};
pub use lines::{LineChanges, LineDeltaTracker};
pub use surfaces::{focused_file, has_ai_capabilities, FocusedFile};
