//! Shared data types for the extraction, orientation, and verification
//! pipelines.
//!
//! Entities here are plain serde-derived structs, not behavior-carrying
//! objects. Every other module builds on these; none of these modules
//! import from each other's siblings.

pub mod building;
pub mod cv;
pub mod document;
pub mod iteration;
pub mod orientation;
pub mod takeoff;
pub mod value;

pub use building::*;
pub use cv::*;
pub use document::*;
pub use iteration::*;
pub use orientation::*;
pub use takeoff::*;
pub use value::*;
