//! Question answering over indexed courses, with sources.
//!
//! [`RagSystem`] wires the model, the course index, the retrieval tools and the
//! session store together.

mod system;

pub use system::{CourseAnalytics, RagAnswer, RagSystem};
