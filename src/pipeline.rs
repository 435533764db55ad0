//! Pipeline composition.
//!
//! Linking is pure structure: connecting two stages means handing the same
//! [`IoChannel`] to the upstream config as output and the downstream config
//! as input. [`Chain`] assembles a linear source → … → sink run and spawns
//! every stage; fan-in stays the mixer's business.

use crate::element::{spawn, Element, ElementConfig, ElementHandle, ElementOps, Status};
use crate::error::Result;
use crate::io::IoChannel;

/// Default capacity of a channel created by linking, in bytes.
pub const DEFAULT_LINK_CAPACITY: usize = 8192;

/// Connect two stage configs with a shared channel.
///
/// Reuses the upstream's existing output channel if it already has one,
/// otherwise creates a buffered channel of `capacity` bytes.
pub fn link(upstream: &mut ElementConfig, downstream: &mut ElementConfig, capacity: usize) {
    let channel = upstream
        .output
        .clone()
        .unwrap_or_else(|| IoChannel::buffered(capacity));
    upstream.output = Some(channel.clone());
    downstream.input = Some(channel);
}

/// Builder for a linear chain of elements.
///
/// Stages are linked in the order they are added; `spawn` starts one task
/// per stage and returns the handles in the same order.
pub struct Chain {
    stages: Vec<(ElementConfig, Box<dyn ElementOps>)>,
    link_capacity: usize,
}

impl Chain {
    /// Empty chain with the default link capacity.
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            link_capacity: DEFAULT_LINK_CAPACITY,
        }
    }

    /// Set the capacity of channels created between stages.
    pub fn with_link_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "link capacity must be non-zero");
        self.link_capacity = capacity;
        self
    }

    /// Append a stage. The first stage is the head of the chain; every
    /// later stage reads what its predecessor writes.
    pub fn stage(mut self, config: ElementConfig, ops: impl ElementOps + 'static) -> Self {
        self.stages.push((config, Box::new(ops)));
        self
    }

    /// Link all stages and start one task per stage.
    pub fn spawn(mut self) -> Result<ChainHandles> {
        for i in 1..self.stages.len() {
            let (head, tail) = self.stages.split_at_mut(i);
            link(&mut head[i - 1].0, &mut tail[0].0, self.link_capacity);
        }
        let mut handles = Vec::with_capacity(self.stages.len());
        for (config, ops) in self.stages {
            handles.push(spawn(Element::from_boxed(config, ops))?);
        }
        Ok(ChainHandles { handles })
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles to a spawned chain, head first.
#[derive(Debug)]
pub struct ChainHandles {
    handles: Vec<ElementHandle>,
}

impl ChainHandles {
    /// The handles, in chain order.
    pub fn handles(&self) -> &[ElementHandle] {
        &self.handles
    }

    /// Handle of the stage with `tag`, if present.
    pub fn by_tag(&self, tag: &str) -> Option<&ElementHandle> {
        self.handles.iter().find(|h| h.tag() == tag)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True for a chain with no stages.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// True once every stage reports `Stopped`.
    pub fn all_stopped(&self) -> bool {
        self.handles.iter().all(|h| h.status() == Status::Stopped)
    }

    /// Shut the chain down head-first, so producers stop feeding before the
    /// stages draining them go away. Returns the first error, after all
    /// stages were shut down.
    pub fn shutdown_all(self) -> Result<()> {
        let mut first_err = None;
        for handle in self.handles {
            let tag = handle.tag().to_string();
            if let Err(e) = handle.shutdown() {
                tracing::warn!(%tag, error = %e, "stage shutdown failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Passthrough, SinkElement};
    use crate::sink::{AudioSink, CaptureSink};
    use std::sync::Arc;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(20);

    #[test]
    fn test_link_shares_one_channel() {
        let mut a = ElementConfig::new("a");
        let mut b = ElementConfig::new("b");
        link(&mut a, &mut b, 64);

        a.output
            .as_ref()
            .unwrap()
            .push(b"xy", TICK)
            .unwrap();
        let mut buf = [0u8; 8];
        let n = b.input.as_ref().unwrap().pop(&mut buf, TICK).unwrap();
        assert_eq!(&buf[..n], b"xy");
    }

    #[test]
    fn test_link_keeps_existing_output() {
        let existing = IoChannel::buffered(64);
        let mut a = ElementConfig::new("a").with_output(existing.clone());
        let mut b = ElementConfig::new("b");
        link(&mut a, &mut b, 64);

        existing.push(b"z", TICK).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(b.input.as_ref().unwrap().pop(&mut buf, TICK).unwrap(), 1);
    }

    #[test]
    fn test_chain_runs_head_to_sink() {
        let head_input = IoChannel::buffered(64);
        let sink = Arc::new(CaptureSink::new());

        let chain = Chain::new()
            .with_link_capacity(64)
            .stage(
                ElementConfig::new("relay-a")
                    .with_input(head_input.clone())
                    .with_read_timeout(TICK),
                Passthrough,
            )
            .stage(
                ElementConfig::new("relay-b").with_read_timeout(TICK),
                Passthrough,
            )
            .stage(
                ElementConfig::new("out").with_read_timeout(TICK),
                SinkElement::new(Arc::clone(&sink) as Arc<dyn AudioSink>),
            )
            .spawn()
            .unwrap();

        assert_eq!(chain.len(), 3);
        assert!(chain.by_tag("relay-b").is_some());

        head_input.push(b"through the chain", TICK).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while sink.bytes_written() < 17 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sink.written(), b"through the chain");

        chain.shutdown_all().unwrap();
    }

    #[test]
    fn test_shutdown_reports_stage_failures() {
        use crate::element::{ElementContext, OpenParams};
        use crate::error::Error;

        struct Refuses;
        impl crate::element::ElementOps for Refuses {
            fn open(&mut self, _: &mut ElementContext, _: &OpenParams) -> Result<()> {
                Err(Error::ResourceUnavailable("nope".into()))
            }
        }

        let chain = Chain::new()
            .stage(ElementConfig::new("ok"), Passthrough)
            .stage(ElementConfig::new("broken"), Refuses)
            .spawn()
            .unwrap();
        assert!(matches!(
            chain.shutdown_all(),
            Err(Error::ResourceUnavailable(_))
        ));
    }
}
