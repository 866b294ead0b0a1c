//! Component G: the pipeline controller. Holds every component handle
//! and coordinates the `Uninitialized -> Capturing -> Stopping` lifecycle
//! (with `Saving` as a state the save coordinator moves into and back out
//! of while `Capturing`), connects the encoder callback to the sample
//! rings, and owns the capture-feed thread that pulls raw frames and
//! pushes them through the encoder session.

mod frame_source;
mod lifecycle;

pub use frame_source::{FrameSource, RawFrame};
pub use lifecycle::{PipelineController, PipelineState};
