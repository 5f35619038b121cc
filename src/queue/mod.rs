//! Command queue: one batch of suggested commands per assistant turn.
//!
//! Items move from pending to executed or skipped in any order. Once every
//! item of the active batch is settled, the aggregated report is sent back
//! into the conversation exactly once.

mod coordinator;
mod item;
mod report;

pub use coordinator::{QueueCoordinator, RenderedCard, RenderedCards};
pub use item::{ItemStatus, Queue, QueueId, QueueItem, SKIPPED_OUTPUT};
pub use report::{build_report, status_glyph, SKIPPED_NOTE};
