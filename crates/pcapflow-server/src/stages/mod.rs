//! # Reference Stages
//!
//! Minimal implementations of every [`StageId`], enough to run a capture
//! end to end.
//!
//! | Stage | Bound context | Per-instance state |
//! |-------|---------------|--------------------|
//! | `ReceivePcapFile` | capture path | open reader |
//! | `DecodePcapFile` | none | decode counters |
//! | `StreamTcp` | none | flow table |
//! | `Detect` | [`DetectContext`] | alert counters |
//! | `AlertFastLog` / `AlertDebugLog` | log directory | shared writer |

pub mod decode;
pub mod detect;
pub mod output;
pub mod receive;
pub mod stream;

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use pcapflow_core::{BoundContext, Stage, StageError, StageId, StaticStageRegistry};

pub use decode::DecodeStage;
pub use detect::DetectStage;
pub use output::{AlertFormat, AlertLogStage, LogFiles};
pub use receive::ReceivePcapStage;
pub use stream::StreamStage;

use crate::rules::DetectContext;

/// Builds a registry with every reference stage.
///
/// `rules` supplies alert messages to the output writers; the detect stage
/// takes its rules from its bound context.
#[must_use]
pub fn registry(rules: Arc<DetectContext>) -> StaticStageRegistry {
    let mut registry = StaticStageRegistry::new();
    registry
        .register(
            StageId::ReceivePcapFile,
            |ctx: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
                let path = bound::<PathBuf>(StageId::ReceivePcapFile, ctx)?;
                Ok(Box::new(ReceivePcapStage::open(path)?))
            },
        )
        .register(
            StageId::DecodePcapFile,
            |_: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
                Ok(Box::new(DecodeStage::new()))
            },
        )
        .register(
            StageId::StreamTcp,
            |_: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
                Ok(Box::new(StreamStage::new()))
            },
        )
        .register(
            StageId::Detect,
            |ctx: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
                let ctx = ctx.ok_or(StageError::MissingContext(StageId::Detect))?;
                let context = Arc::clone(ctx)
                    .downcast::<DetectContext>()
                    .map_err(|_| StageError::ContextType(StageId::Detect))?;
                Ok(Box::new(DetectStage::new(context)))
            },
        );

    let files = Arc::new(LogFiles::new());
    for id in [StageId::AlertFastLog, StageId::AlertDebugLog] {
        let Some(format) = AlertFormat::for_stage(id) else {
            continue;
        };
        let files = Arc::clone(&files);
        let rules = Arc::clone(&rules);
        registry.register(
            id,
            move |ctx: Option<&BoundContext>| -> Result<Box<dyn Stage>, StageError> {
                let log_dir = bound::<PathBuf>(id, ctx)?;
                let log = files.open(&log_dir.join(format.file_name()))?;
                Ok(Box::new(AlertLogStage::new(format, log, Arc::clone(&rules))))
            },
        );
    }
    registry
}

/// Borrows the bound context of `id` as a `T`.
fn bound<T: Any>(id: StageId, ctx: Option<&BoundContext>) -> Result<&T, StageError> {
    let ctx = ctx.ok_or(StageError::MissingContext(id))?;
    (**ctx)
        .downcast_ref::<T>()
        .ok_or(StageError::ContextType(id))
}
