//! The generic element task driver.
//!
//! Written once against [`ElementOps`]: spawns a dedicated thread, opens the
//! element, alternates control-message handling with processing steps, and
//! exits on `Stop`. The thread never tears the element down itself; it hands
//! the element back through the join handle so [`ElementHandle::shutdown`]
//! can free it from the caller's context.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::element::{
    ControlMessage, Element, Status, StatusCell, CONTROL_QUEUE_LEN,
};
use crate::error::{Error, Result};

/// How long a paused task blocks on its control queue per wait.
const PAUSED_WAIT: Duration = Duration::from_millis(100);
/// Backoff after a closed input, so the loop does not spin.
const CLOSED_BACKOFF: Duration = Duration::from_millis(20);

/// External handle to a running element task.
///
/// Dropping the handle stops and joins the task.
pub struct ElementHandle {
    tag: String,
    ctrl: kanal::Sender<ControlMessage>,
    status: Arc<StatusCell>,
    join: Option<JoinHandle<(Element, Result<()>)>>,
}

impl ElementHandle {
    /// The element's tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Status as last published by the task.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Post a control message.
    ///
    /// A full queue is reported as [`Error::ChannelFull`]: it means the
    /// target task is not consuming messages, which the caller must know.
    pub fn send(&self, msg: ControlMessage) -> Result<()> {
        match self.ctrl.try_send(msg) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::ChannelFull),
            Err(_) => Err(Error::Closed),
        }
    }

    /// Request a transition to `Playing`.
    pub fn play(&self) -> Result<()> {
        self.send(ControlMessage::SetStatus(Status::Playing))
    }

    /// Request a transition to `Paused`.
    pub fn pause(&self) -> Result<()> {
        self.send(ControlMessage::SetStatus(Status::Paused))
    }

    /// Request the task to stop. Advisory: an in-flight processing step
    /// completes or times out before the task observes it.
    pub fn stop(&self) -> Result<()> {
        self.send(ControlMessage::Stop)
    }

    /// Stop the task, join it, and tear the element down on this thread.
    ///
    /// Returns the element's close result, or the open error if the task
    /// never entered its loop.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        // The task may already be gone; a failed send is fine here.
        let _ = self.send(ControlMessage::Stop);
        match join.join() {
            Ok((element, result)) => {
                // Teardown happens here, outside the element's own task.
                drop(element);
                result
            }
            Err(_) => Err(Error::ResourceUnavailable(format!(
                "element task '{}' panicked",
                self.tag
            ))),
        }
    }
}

impl Drop for ElementHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_inner();
    }
}

impl std::fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("tag", &self.tag)
            .field("status", &self.status.get())
            .finish()
    }
}

/// Start the element's dedicated task and return its handle.
pub fn spawn(element: Element) -> Result<ElementHandle> {
    let (ctrl_tx, ctrl_rx) = kanal::bounded(CONTROL_QUEUE_LEN);
    let status = element.status_cell();
    let tag = element.tag().to_string();

    let join = thread::Builder::new()
        .name(tag.clone())
        .spawn(move || run(element, ctrl_rx))
        .map_err(Error::Io)?;

    Ok(ElementHandle {
        tag,
        ctrl: ctrl_tx,
        status,
        join: Some(join),
    })
}

fn run(
    mut element: Element,
    ctrl: kanal::Receiver<ControlMessage>,
) -> (Element, Result<()>) {
    let tag = element.tag().to_string();

    if let Err(e) = element.open() {
        tracing::error!(%tag, error = %e, "open failed, task will not process");
        return (element, Err(e));
    }
    tracing::debug!(%tag, "processing loop started");

    loop {
        // Paused tasks block on the control queue so message delivery wakes
        // them; playing tasks only peek, their bounded wait lives in the
        // input pop.
        let msg = if element.status() == Status::Paused {
            match ctrl.recv_timeout(PAUSED_WAIT) {
                Ok(m) => Some(m),
                Err(kanal::ReceiveErrorTimeout::Timeout) => None,
                Err(_) => {
                    tracing::debug!(%tag, "control channel closed, stopping");
                    break;
                }
            }
        } else {
            match ctrl.try_recv() {
                Ok(m) => m,
                Err(_) => {
                    tracing::debug!(%tag, "control channel closed, stopping");
                    break;
                }
            }
        };

        if let Some(msg) = msg {
            if apply_message(&element, &tag, msg) {
                break;
            }
            continue;
        }

        if element.status() == Status::Paused {
            continue;
        }

        match element.process_step() {
            Ok(0) => {
                // No data yet. The pop already waited its timeout; just note
                // the state. Elements without an input provide their own
                // pacing inside process (tone, mixer idle sleep).
                if element.status() == Status::Playing && element.has_input() {
                    tracing::trace!(%tag, "input empty, waiting");
                    element.set_status(Status::Waiting);
                }
            }
            Ok(n) => {
                if element.status() == Status::Waiting {
                    element.set_status(Status::Playing);
                }
                tracing::trace!(%tag, bytes = n, "step complete");
            }
            Err(Error::ChannelFull) => {
                tracing::warn!(%tag, "could not write to output, retrying next step");
            }
            Err(Error::Closed) => {
                tracing::debug!(%tag, "input closed, waiting");
                element.set_status(Status::Waiting);
                thread::sleep(CLOSED_BACKOFF);
            }
            Err(e) => {
                tracing::warn!(%tag, error = %e, "process step failed");
            }
        }
    }

    element.set_status(Status::Stopped);
    tracing::debug!(%tag, "closing");
    let result = element.close();
    (element, result)
}

/// Apply one control message. Returns true when the task must exit.
fn apply_message(element: &Element, tag: &str, msg: ControlMessage) -> bool {
    match msg {
        ControlMessage::Stop => {
            tracing::debug!(%tag, "stop requested");
            true
        }
        ControlMessage::SetStatus(next @ (Status::Playing | Status::Paused)) => {
            let current = element.status();
            tracing::debug!(%tag, from = current.as_str(), to = next.as_str(), "status change");
            element.set_status(next);
            false
        }
        ControlMessage::SetStatus(other) => {
            // Waiting is internal and Stopped goes through Stop.
            tracing::warn!(%tag, requested = other.as_str(), "unsupported status request ignored");
            false
        }
        ControlMessage::Custom { id, .. } => {
            tracing::warn!(%tag, id, "unknown control message ignored");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementConfig, ElementContext, ElementOps};
    use crate::io::IoChannel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TICK: Duration = Duration::from_millis(20);

    struct Passthrough;
    impl ElementOps for Passthrough {}

    fn passthrough_element(input: &IoChannel, output: &IoChannel) -> Element {
        Element::new(
            ElementConfig::new("passthrough")
                .with_input(input.clone())
                .with_output(output.clone())
                .with_read_timeout(TICK),
            Passthrough,
        )
    }

    #[test]
    fn test_task_moves_data_end_to_end() {
        let input = IoChannel::buffered(256);
        let output = IoChannel::buffered(256);
        let handle = spawn(passthrough_element(&input, &output)).unwrap();

        input.push(b"stream me", Duration::from_millis(200)).unwrap();

        let mut buf = [0u8; 32];
        let mut got = 0;
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while got < 9 && std::time::Instant::now() < deadline {
            got += output.pop(&mut buf[got..], TICK).unwrap();
        }
        assert_eq!(&buf[..got], b"stream me");
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_paused_task_skips_processing() {
        struct Counting(Arc<AtomicUsize>);
        impl ElementOps for Counting {
            fn process(&mut self, _: &mut ElementContext) -> Result<usize> {
                self.0.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                Ok(1)
            }
        }
        let steps = Arc::new(AtomicUsize::new(0));
        let handle = spawn(Element::new(
            ElementConfig::new("counter"),
            Counting(Arc::clone(&steps)),
        ))
        .unwrap();

        handle.pause().unwrap();
        // Wait for the pause to land, then check the counter stays put.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while handle.status() != Status::Paused && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.status(), Status::Paused);
        let frozen = steps.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(steps.load(Ordering::SeqCst), frozen);

        // And a resume unfreezes it.
        handle.play().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while steps.load(Ordering::SeqCst) == frozen && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(steps.load(Ordering::SeqCst) > frozen);
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_open_failure_surfaces_in_shutdown() {
        struct Refuses;
        impl ElementOps for Refuses {
            fn open(&mut self, _: &mut ElementContext, _: &crate::element::OpenParams) -> Result<()> {
                Err(Error::ResourceUnavailable("nope".into()))
            }
        }
        let handle = spawn(Element::new(ElementConfig::new("broken"), Refuses)).unwrap();
        assert!(matches!(
            handle.shutdown(),
            Err(Error::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn test_teardown_runs_on_the_callers_thread() {
        struct DropTracker(Arc<Mutex<Option<thread::ThreadId>>>);
        impl ElementOps for DropTracker {
            fn process(&mut self, _: &mut ElementContext) -> Result<usize> {
                thread::sleep(Duration::from_millis(1));
                Ok(0)
            }
        }
        impl Drop for DropTracker {
            fn drop(&mut self) {
                *self.0.lock().unwrap() = Some(thread::current().id());
            }
        }

        let dropped_on = Arc::new(Mutex::new(None));
        let handle = spawn(Element::new(
            ElementConfig::new("tracked"),
            DropTracker(Arc::clone(&dropped_on)),
        ))
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        handle.shutdown().unwrap();

        let id = dropped_on.lock().unwrap().expect("ops were dropped");
        assert_eq!(id, thread::current().id(), "teardown must be external");
    }

    #[test]
    fn test_unknown_message_is_ignored() {
        let handle = spawn(Element::new(ElementConfig::new("tolerant"), Passthrough)).unwrap();
        handle
            .send(ControlMessage::Custom {
                id: 0xdead,
                payload: bytes::Bytes::from_static(b"?"),
            })
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        // Still alive and stoppable.
        handle.shutdown().unwrap();
    }
}
