pub mod classification_loop;
pub mod label;
pub mod overlay;

pub use classification_loop::{ClassificationLoop, LoopSettings, LoopStats};
pub use label::{LabelSnapshot, LabelState};
pub use overlay::{place_after, OverlayPlacement, OverlayRecord, PlacementState};
