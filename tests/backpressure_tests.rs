//! Backpressure behavior of the byte channels and of element chains built
//! on top of them.

use std::thread;
use std::time::{Duration, Instant};

use tributary::element::{ElementConfig, spawn, Element};
use tributary::elements::Passthrough;
use tributary::io::IoChannel;
use tributary::Error;

const TICK: Duration = Duration::from_millis(20);

#[test]
fn test_full_channel_fails_within_the_timeout_window() {
    let ch = IoChannel::buffered(8);
    ch.push(&[0u8; 8], TICK).unwrap();

    let timeout = Duration::from_millis(150);
    let started = Instant::now();
    let err = ch.push(b"overflow", timeout).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::ChannelFull));
    // The deadline is honored: not early, and not stuck far past it.
    assert!(elapsed >= timeout, "returned early: {elapsed:?}");
    assert!(
        elapsed < timeout + Duration::from_millis(500),
        "returned late: {elapsed:?}"
    );
}

#[test]
fn test_partial_write_does_not_count_as_full() {
    let ch = IoChannel::buffered(8);
    ch.push(&[0u8; 6], TICK).unwrap();
    // Two bytes of room: the push accepts them instead of failing.
    assert_eq!(ch.push(&[1u8; 8], TICK).unwrap(), 2);
}

#[test]
fn test_blocked_writer_resumes_when_reader_drains() {
    let ch = IoChannel::buffered(4);
    ch.push(&[0u8; 4], TICK).unwrap();

    let writer = {
        let ch = ch.clone();
        thread::spawn(move || ch.push(b"more", Duration::from_secs(5)))
    };

    thread::sleep(Duration::from_millis(30));
    let mut buf = [0u8; 4];
    ch.pop(&mut buf, TICK).unwrap();

    // The drain wakes the writer well before its deadline.
    let accepted = writer.join().unwrap().unwrap();
    assert!(accepted > 0);
}

#[test]
fn test_slow_consumer_throttles_the_whole_chain() {
    // Tiny channels on both sides of a relay: the producer can only make
    // progress as fast as the final consumer drains.
    let input = IoChannel::buffered(4);
    let output = IoChannel::buffered(4);
    let handle = spawn(Element::new(
        ElementConfig::new("relay")
            .with_input(input.clone())
            .with_output(output.clone())
            .with_scratch_len(4)
            .with_read_timeout(TICK),
        Passthrough,
    ))
    .unwrap();

    let total = 64usize;
    let producer = {
        let input = input.clone();
        thread::spawn(move || {
            let mut sent = 0usize;
            while sent < total {
                let data: Vec<u8> = (sent..total.min(sent + 4)).map(|v| v as u8).collect();
                match input.push(&data, Duration::from_secs(1)) {
                    Ok(n) => sent += n,
                    Err(Error::ChannelFull) => continue,
                    Err(e) => panic!("push failed: {e}"),
                }
            }
        })
    };

    let mut received = Vec::new();
    let mut buf = [0u8; 4];
    let deadline = Instant::now() + Duration::from_secs(10);
    while received.len() < total && Instant::now() < deadline {
        // Drain deliberately slowly.
        thread::sleep(Duration::from_millis(2));
        match output.pop(&mut buf, TICK) {
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) => panic!("pop failed: {e}"),
        }
    }
    producer.join().unwrap();
    assert_eq!(received.len(), total);
    for (i, b) in received.iter().enumerate() {
        assert_eq!(*b, i as u8, "byte {i}");
    }

    handle.shutdown().unwrap();
}
