//! Concrete pipeline stages.
//!
//! Each stage is an [`ElementOps`](crate::element::ElementOps)
//! implementation; the framework in [`element`](crate::element) runs them.

mod file;
mod passthrough;
mod sink;

pub use file::FileSource;
pub use passthrough::Passthrough;
pub use sink::SinkElement;
