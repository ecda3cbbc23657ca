mod color;
mod contours;
mod filter;
mod motion;
mod pipeline;
mod preprocess;

pub use contours::BoundingBox;
pub use filter::Detection;
pub use pipeline::DetectionPipeline;
pub use preprocess::Preprocessor;
