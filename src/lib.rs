//! Annotation core for design-canvas scene graphs: select the nodes worth
//! labeling, lay numeric badges out around their highlight boxes without
//! collisions, and composite both onto a raster copy of the rendered design
//! for consumption by a vision model.
//!
//! The pipeline is select → initialize → optimize → compose; every stage is
//! a pure function over its inputs, and the optimizer takes an injected RNG
//! so tests can pin a seed.

pub mod label;
pub mod optimize;
pub mod overlap;
pub mod render;
pub mod scene;
pub mod select;

pub use label::{initialize_labels, BadgeStyle, LabelPlacement};
pub use optimize::{optimize_label_positions, optimize_labels, AnnealParams};
pub use overlap::{detect_overlap, union_box};
pub use render::{compose, parse_color, render_annotated, AnnotationStyle, HighlightStyle};
pub use scene::{load_scene, BoundingBox, NodeMetadata, NodeType, SceneNode, TraversalConfig};
pub use select::{batches, is_default_name, select};
