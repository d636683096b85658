// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod event;
pub mod item;
pub mod summary;
pub mod task;

pub use event::{EventKind, EventPayload, ProgressEvent};
pub use item::{DescriptionRecord, Item, ItemRef, SearchPage};
pub use summary::{
    AggregatedSummary, EvaluationReport, MissingSentence, SentenceScore, SummaryReport,
};
pub use task::{NewTask, Task, TaskId, TaskStatus};
