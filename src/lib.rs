//! # Tributary
//!
//! A real-time audio mixing pipeline built from independent elements.
//!
//! Elements (sources, relays, the mixer, sinks) each run on a dedicated
//! thread, exchange interleaved PCM bytes through bounded channels, and are
//! paused, resumed and stopped through out-of-band control messages while
//! the stream keeps flowing.
//!
//! ## Features
//!
//! - **Element framework**: open/process/close lifecycle, generic task driver
//! - **Multi-source mixing**: integer decode/sum/encode at 1-4 byte widths,
//!   sample-and-hold rate matching, wrapping arithmetic
//! - **Source registry**: named producer slots (file, network, tone) feeding
//!   the mixer through their own buffered channels
//! - **Bounded byte channels**: blocking push/pop with timeouts, partial
//!   transfers, explicit close
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tributary::prelude::*;
//!
//! # fn main() -> tributary::Result<()> {
//! let registry = Arc::new(SourceRegistry::new());
//! let beeper = registry.register(
//!     SourceKind::Tone,
//!     "beeper",
//!     4096,
//!     StreamFormat::new(44_100, 2, 16),
//! )?;
//! spawn_tone(beeper, ToneSpec::sine(440, 1_000))?;
//!
//! let sink = Arc::new(NullSink) as Arc<dyn AudioSink>;
//! let mixer = Mixer::new(Arc::clone(&registry)).with_sink(sink);
//! let handle = spawn(Element::new(ElementConfig::new("mixer"), mixer))?;
//! // ... stream runs; later:
//! handle.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod element;
pub mod elements;
pub mod error;
pub mod format;
pub mod io;
pub mod mixer;
pub mod pcm;
pub mod pipeline;
pub mod registry;
pub mod sink;
pub mod tone;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::element::{
        spawn, ControlMessage, Element, ElementConfig, ElementHandle, ElementOps, OpenParams,
        Status,
    };
    pub use crate::elements::{FileSource, Passthrough, SinkElement};
    pub use crate::error::{Error, Result};
    pub use crate::format::{SharedFormat, StreamFormat};
    pub use crate::io::IoChannel;
    pub use crate::mixer::Mixer;
    pub use crate::pipeline::{link, Chain, ChainHandles};
    pub use crate::registry::{SourceContext, SourceKind, SourceRegistry, SourceStatus};
    pub use crate::sink::{AudioSink, CaptureSink, NullSink};
    pub use crate::tone::{spawn_tone, render_cycle, ToneSpec, Waveform};
}

pub use error::{Error, Result};
