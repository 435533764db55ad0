//! Registry of audio sources feeding the mixer.
//!
//! Producers (an SD-card reader, a Bluetooth callback, a tone task) register
//! once and get back an [`Arc<SourceContext>`]: a named slot owning a
//! buffered channel the mixer drains. The registry is an explicit instance
//! shared by `Arc`, never a process-wide global; producer callbacks capture
//! their own context clone instead of reaching into shared tables.
//!
//! Registration and status changes are control-plane operations and take the
//! slot lock; the data plane ([`SourceContext::write`]) touches only the
//! source's own channel.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Thread};
use std::time::Duration;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::format::StreamFormat;
use crate::io::IoChannel;

/// Maximum number of registered sources.
pub const MAX_SOURCES: usize = 8;

/// Interval a paused producer re-checks its status at, as a fallback for a
/// missed unpark.
const PARK_TICK: Duration = Duration::from_millis(100);

/// What kind of producer feeds a source slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// File/storage reader.
    SdCard,
    /// A2DP-style network audio callback.
    Bluetooth,
    /// Synthesized tone.
    Tone,
}

impl SourceKind {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::SdCard => "sdcard",
            SourceKind::Bluetooth => "bluetooth",
            SourceKind::Tone => "tone",
        }
    }
}

/// Lifecycle of a source slot.
///
/// `Uninitialized` only exists between registration and the producer's first
/// status publication; external status changes are rejected until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceStatus {
    /// Registered, producer not running yet.
    Uninitialized = 0,
    /// Producer running, no data yet.
    Waiting = 1,
    /// Producer finished or not streaming.
    Stopped = 2,
    /// Suspended; excluded from mixing.
    Paused = 3,
    /// Actively streaming; included in mixing.
    Playing = 4,
}

impl SourceStatus {
    fn from_u8(v: u8) -> SourceStatus {
        match v {
            1 => SourceStatus::Waiting,
            2 => SourceStatus::Stopped,
            3 => SourceStatus::Paused,
            4 => SourceStatus::Playing,
            _ => SourceStatus::Uninitialized,
        }
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Uninitialized => "UNINITIALIZED",
            SourceStatus::Waiting => "WAITING",
            SourceStatus::Stopped => "STOPPED",
            SourceStatus::Paused => "PAUSED",
            SourceStatus::Playing => "PLAYING",
        }
    }
}

/// One registered source: identity, its buffered channel, and its status.
///
/// Handed out as `Arc<SourceContext>`; the producer side writes, the mixer
/// side drains, and either can observe the status cell.
pub struct SourceContext {
    kind: SourceKind,
    name: String,
    channel: IoChannel,
    status: AtomicU8,
    /// Producer thread handle, for unpark-on-resume. Bound lazily by the
    /// producer task itself.
    exec: Mutex<Option<Thread>>,
}

impl SourceContext {
    fn new(kind: SourceKind, name: String, channel: IoChannel) -> Self {
        Self {
            kind,
            name,
            channel,
            status: AtomicU8::new(SourceStatus::Uninitialized as u8),
            exec: Mutex::new(None),
        }
    }

    /// The slot's kind.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// The slot's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The channel the mixer drains.
    pub fn channel(&self) -> &IoChannel {
        &self.channel
    }

    /// Current status.
    pub fn status(&self) -> SourceStatus {
        SourceStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Publish a new status. Producers use this to leave `Uninitialized`
    /// and to report `Stopped` at end of stream.
    pub fn set_status(&self, status: SourceStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Record the calling thread as this source's producer, enabling
    /// unpark-on-resume. Call once at producer startup.
    pub fn bind_producer(&self) {
        *self.exec.lock().expect("source exec poisoned") = Some(thread::current());
    }

    /// Block the calling producer while the source is `Paused`.
    ///
    /// Cooperative: a resume unparks immediately, and the park is bounded so
    /// a missed wakeup only costs one tick.
    pub fn wait_while_paused(&self) {
        while self.status() == SourceStatus::Paused {
            thread::park_timeout(PARK_TICK);
        }
    }

    /// Push PCM bytes into the source's channel, blocking up to `timeout`.
    ///
    /// Steady-state allocation free; safe to call from a foreign driver
    /// callback as long as that context tolerates the bounded block.
    pub fn write(&self, bytes: &[u8], timeout: Duration) -> Result<usize> {
        self.channel.push(bytes, timeout)
    }

    fn unpark_producer(&self) {
        if let Some(t) = self.exec.lock().expect("source exec poisoned").as_ref() {
            t.unpark();
        }
    }
}

impl std::fmt::Debug for SourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceContext")
            .field("kind", &self.kind.as_str())
            .field("name", &self.name)
            .field("status", &self.status().as_str())
            .field("buffered", &self.channel.buffered_len())
            .finish()
    }
}

/// Fixed-capacity table of registered sources.
pub struct SourceRegistry {
    slots: Mutex<SmallVec<[Arc<SourceContext>; MAX_SOURCES]>>,
}

impl SourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(SmallVec::new()),
        }
    }

    /// Register a source of `kind` with a channel of `capacity` bytes and
    /// the given initial stream format.
    ///
    /// One slot per kind; a second registration of the same kind is
    /// [`Error::AlreadyRegistered`], a full table is
    /// [`Error::CapacityExceeded`].
    pub fn register(
        &self,
        kind: SourceKind,
        name: impl Into<String>,
        capacity: usize,
        format: StreamFormat,
    ) -> Result<Arc<SourceContext>> {
        let mut slots = self.slots.lock().expect("registry poisoned");
        if slots.iter().any(|s| s.kind == kind) {
            return Err(Error::AlreadyRegistered(kind.as_str()));
        }
        if slots.len() >= MAX_SOURCES {
            return Err(Error::CapacityExceeded(MAX_SOURCES));
        }
        let name = name.into();
        let channel = IoChannel::buffered_with_format(capacity, format);
        let ctx = Arc::new(SourceContext::new(kind, name, channel));
        tracing::debug!(kind = kind.as_str(), name = %ctx.name, "source registered");
        slots.push(Arc::clone(&ctx));
        Ok(ctx)
    }

    /// Find the source of `kind`, if registered.
    pub fn lookup(&self, kind: SourceKind) -> Option<Arc<SourceContext>> {
        self.slots
            .lock()
            .expect("registry poisoned")
            .iter()
            .find(|s| s.kind == kind)
            .cloned()
    }

    /// Push bytes into the source of `kind`.
    ///
    /// Convenience for producers that hold the registry rather than their
    /// own context clone. Unregistered kind is [`Error::ResourceUnavailable`].
    pub fn write(&self, kind: SourceKind, bytes: &[u8], timeout: Duration) -> Result<usize> {
        let ctx = self.lookup(kind).ok_or_else(|| {
            Error::ResourceUnavailable(format!("source '{}' not registered", kind.as_str()))
        })?;
        ctx.write(bytes, timeout)
    }

    /// Change the status of the source of `kind`.
    ///
    /// Rejected while the slot is `Uninitialized` (the producer has not
    /// started). A transition to `Playing` unparks a paused producer.
    pub fn set_status(&self, kind: SourceKind, status: SourceStatus) -> Result<()> {
        let ctx = self.lookup(kind).ok_or_else(|| {
            Error::ResourceUnavailable(format!("source '{}' not registered", kind.as_str()))
        })?;
        if ctx.status() == SourceStatus::Uninitialized {
            return Err(Error::ResourceUnavailable(format!(
                "source '{}' not initialized",
                ctx.name
            )));
        }
        tracing::debug!(
            kind = kind.as_str(),
            from = ctx.status().as_str(),
            to = status.as_str(),
            "source status change"
        );
        ctx.set_status(status);
        if status == SourceStatus::Playing {
            ctx.unpark_producer();
        }
        Ok(())
    }

    /// All sources currently in `status`, in registration order.
    pub fn all_with_status(
        &self,
        status: SourceStatus,
    ) -> SmallVec<[Arc<SourceContext>; MAX_SOURCES]> {
        self.slots
            .lock()
            .expect("registry poisoned")
            .iter()
            .filter(|s| s.status() == status)
            .cloned()
            .collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("registry poisoned").len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(20);

    fn fmt() -> StreamFormat {
        StreamFormat::default()
    }

    #[test]
    fn test_register_and_lookup() {
        let reg = SourceRegistry::new();
        let ctx = reg
            .register(SourceKind::Tone, "beeper", 64, fmt())
            .unwrap();
        assert_eq!(ctx.status(), SourceStatus::Uninitialized);
        assert!(Arc::ptr_eq(&ctx, &reg.lookup(SourceKind::Tone).unwrap()));
        assert!(reg.lookup(SourceKind::SdCard).is_none());
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let reg = SourceRegistry::new();
        reg.register(SourceKind::Tone, "a", 64, fmt()).unwrap();
        assert!(matches!(
            reg.register(SourceKind::Tone, "b", 64, fmt()),
            Err(Error::AlreadyRegistered("tone"))
        ));
    }

    #[test]
    fn test_write_reaches_the_channel() {
        let reg = SourceRegistry::new();
        let ctx = reg
            .register(SourceKind::Bluetooth, "phone", 64, fmt())
            .unwrap();
        assert_eq!(reg.write(SourceKind::Bluetooth, b"\x01\x02", TICK).unwrap(), 2);
        let mut buf = [0u8; 8];
        assert_eq!(ctx.channel().pop(&mut buf, TICK).unwrap(), 2);
        assert_eq!(&buf[..2], b"\x01\x02");
    }

    #[test]
    fn test_write_unregistered_kind_fails() {
        let reg = SourceRegistry::new();
        assert!(matches!(
            reg.write(SourceKind::SdCard, b"x", TICK),
            Err(Error::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn test_status_change_rejected_before_producer_starts() {
        let reg = SourceRegistry::new();
        reg.register(SourceKind::Tone, "beeper", 64, fmt()).unwrap();
        assert!(matches!(
            reg.set_status(SourceKind::Tone, SourceStatus::Playing),
            Err(Error::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn test_all_with_status_keeps_registration_order() {
        let reg = SourceRegistry::new();
        let a = reg.register(SourceKind::SdCard, "card", 64, fmt()).unwrap();
        let b = reg
            .register(SourceKind::Bluetooth, "phone", 64, fmt())
            .unwrap();
        let c = reg.register(SourceKind::Tone, "beeper", 64, fmt()).unwrap();
        for ctx in [&a, &b, &c] {
            ctx.set_status(SourceStatus::Playing);
        }
        b.set_status(SourceStatus::Paused);

        let playing = reg.all_with_status(SourceStatus::Playing);
        assert_eq!(playing.len(), 2);
        assert_eq!(playing[0].kind(), SourceKind::SdCard);
        assert_eq!(playing[1].kind(), SourceKind::Tone);
    }

    #[test]
    fn test_resume_unparks_a_paused_producer() {
        let reg = Arc::new(SourceRegistry::new());
        let ctx = reg.register(SourceKind::Tone, "beeper", 64, fmt()).unwrap();

        let producer = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                ctx.bind_producer();
                ctx.set_status(SourceStatus::Paused);
                ctx.wait_while_paused();
                ctx.set_status(SourceStatus::Stopped);
            })
        };

        // Wait for the producer to park itself.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ctx.status() != SourceStatus::Paused && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        reg.set_status(SourceKind::Tone, SourceStatus::Playing).unwrap();
        producer.join().unwrap();
        assert_eq!(ctx.status(), SourceStatus::Stopped);
    }
}
