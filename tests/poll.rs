extern crate woliu;

use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use woliu::poll::{IoVec, PollEvent, Poller};

fn start(poll: &Poller) -> thread::JoinHandle<io::Result<()>> {
    let poll = poll.clone();
    thread::spawn(move || poll.wait())
}

#[test]
fn benign_wake() {
    let poll = Poller::new().unwrap();
    let reactor = start(&poll);

    for _ in 0..100 {
        poll.trigger().unwrap();
    }
    thread::sleep(Duration::from_millis(100));

    poll.close().unwrap();
    reactor.join().unwrap().unwrap();
}

#[test]
fn coalesced_shutdown() {
    let poll = Poller::new().unwrap();
    let reactor = start(&poll);

    poll.close().unwrap();
    let _ = poll.close();

    reactor.join().unwrap().unwrap();
}

#[test]
fn read_then_peer_close() {
    let poll = Poller::new().unwrap();
    let reactor = start(&poll);

    let (sock, mut peer) = UnixStream::pair().unwrap();
    sock.set_nonblocking(true).unwrap();

    let (ack_tx, ack_rx) = mpsc::channel();
    let (hup_tx, hup_rx) = mpsc::channel();

    let op = poll.alloc();
    op.fd = sock.as_raw_fd();
    let mut buf = vec![0u8; 4096];
    op.inputs = Some(Box::new(move |iovs: &mut [IoVec]| {
        iovs[0] = IoVec::from_mut(&mut buf[..]);
        1
    }));
    op.input_ack = Some(Box::new(move |n| {
        let _ = ack_tx.send(n);
        Ok(())
    }));
    op.on_hup = Some(Box::new(move |_: &Poller| {
        let _ = hup_tx.send(());
        Ok(())
    }));
    poll.control(op, PollEvent::Readable).unwrap();

    peer.write_all(b"hello\n").unwrap();
    drop(peer);

    assert_eq!(ack_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 6);
    // teardown runs off the reactor after the batch
    hup_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    poll.close().unwrap();
    reactor.join().unwrap().unwrap();
}

#[test]
fn on_read_callback() {
    let poll = Poller::new().unwrap();
    let reactor = start(&poll);

    let (sock, mut peer) = UnixStream::pair().unwrap();
    sock.set_nonblocking(true).unwrap();

    let (tx, rx) = mpsc::channel();
    let op = poll.alloc();
    op.fd = sock.as_raw_fd();
    let mut reader = sock.try_clone().unwrap();
    op.on_read = Some(Box::new(move |_: &Poller| {
        let mut buf = [0u8; 64];
        let n = reader.read(&mut buf)?;
        let _ = tx.send(n);
        Ok(())
    }));
    poll.control(op, PollEvent::Readable).unwrap();

    peer.write_all(b"ding").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 4);

    poll.close().unwrap();
    reactor.join().unwrap().unwrap();
}

#[test]
fn edge_triggered_write() {
    let poll = Poller::new().unwrap();
    let reactor = start(&poll);

    let (sock, mut peer) = UnixStream::pair().unwrap();
    sock.set_nonblocking(true).unwrap();

    let (tx, rx) = mpsc::channel();
    let op = poll.alloc();
    op.fd = sock.as_raw_fd();
    let mut sent = false;
    op.outputs = Some(Box::new(move |iovs: &mut [IoVec]| {
        if sent {
            (0, false)
        } else {
            sent = true;
            iovs[0] = IoVec::from_ref(b"pong");
            (1, false)
        }
    }));
    op.output_ack = Some(Box::new(move |n| {
        let _ = tx.send(n);
        Ok(())
    }));
    poll.control(op, PollEvent::Writable).unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 4);
    // edge-triggered: a quiet socket must not report OUT again
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    let mut buf = [0u8; 4];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong");

    poll.close().unwrap();
    reactor.join().unwrap().unwrap();
}

#[test]
fn mod_read_write() {
    let poll = Poller::new().unwrap();
    let reactor = start(&poll);

    let (sock, mut peer) = UnixStream::pair().unwrap();
    sock.set_nonblocking(true).unwrap();

    let (rtx, rrx) = mpsc::channel();
    let (wtx, wrx) = mpsc::channel();

    let op = poll.alloc();
    op.fd = sock.as_raw_fd();
    let mut rbuf = vec![0u8; 1024];
    op.inputs = Some(Box::new(move |iovs: &mut [IoVec]| {
        iovs[0] = IoVec::from_mut(&mut rbuf[..]);
        1
    }));
    op.input_ack = Some(Box::new(move |n| {
        let _ = rtx.send(n);
        Ok(())
    }));
    let mut queued = true;
    op.outputs = Some(Box::new(move |iovs: &mut [IoVec]| {
        if queued {
            queued = false;
            iovs[0] = IoVec::from_ref(b"pong");
            (1, false)
        } else {
            (0, false)
        }
    }));
    op.output_ack = Some(Box::new(move |n| {
        let _ = wtx.send(n);
        Ok(())
    }));
    poll.control(op, PollEvent::Readable).unwrap();

    peer.write_all(b"ping").unwrap();
    assert_eq!(rrx.recv_timeout(Duration::from_secs(5)).unwrap(), 4);

    poll.control(op, PollEvent::R2Rw).unwrap();
    assert_eq!(wrx.recv_timeout(Duration::from_secs(5)).unwrap(), 4);
    let mut buf = [0u8; 4];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong");

    poll.control(op, PollEvent::Rw2R).unwrap();
    poll.control(op, PollEvent::ModReadable).unwrap();
    peer.write_all(b"ding").unwrap();
    assert_eq!(rrx.recv_timeout(Duration::from_secs(5)).unwrap(), 4);

    poll.close().unwrap();
    reactor.join().unwrap().unwrap();
}

#[test]
fn detach_then_reuse() {
    let poll = Poller::new().unwrap();
    let reactor = start(&poll);

    let (sock, mut peer) = UnixStream::pair().unwrap();
    sock.set_nonblocking(true).unwrap();

    let (tx, rx) = mpsc::channel();
    let op = poll.alloc();
    op.fd = sock.as_raw_fd();
    let mut buf = vec![0u8; 256];
    op.inputs = Some(Box::new(move |iovs: &mut [IoVec]| {
        iovs[0] = IoVec::from_mut(&mut buf[..]);
        1
    }));
    op.input_ack = Some(Box::new(move |n| {
        let _ = tx.send(n);
        Ok(())
    }));
    poll.control(op, PollEvent::Readable).unwrap();

    peer.write_all(b"one").unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);

    // a detached descriptor must produce no further deliveries
    poll.control(op, PollEvent::Detach).unwrap();
    thread::sleep(Duration::from_millis(100));
    peer.write_all(b"two").unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    poll.free(op);
    // run a batch so the cache reclaims the slot
    poll.trigger().unwrap();
    thread::sleep(Duration::from_millis(100));

    let (sock2, mut peer2) = UnixStream::pair().unwrap();
    sock2.set_nonblocking(true).unwrap();
    let (tx2, rx2) = mpsc::channel();
    let op2 = poll.alloc();
    op2.fd = sock2.as_raw_fd();
    let mut buf2 = vec![0u8; 256];
    op2.inputs = Some(Box::new(move |iovs: &mut [IoVec]| {
        iovs[0] = IoVec::from_mut(&mut buf2[..]);
        1
    }));
    op2.input_ack = Some(Box::new(move |n| {
        let _ = tx2.send(n);
        Ok(())
    }));
    poll.control(op2, PollEvent::Readable).unwrap();

    peer2.write_all(b"three").unwrap();
    assert_eq!(rx2.recv_timeout(Duration::from_secs(5)).unwrap(), 5);

    poll.close().unwrap();
    reactor.join().unwrap().unwrap();
}

#[test]
fn batch_saturation() {
    const N: usize = 200;

    let poll = Poller::new().unwrap();

    let total = Arc::new(AtomicUsize::new(0));
    let mut pairs = Vec::with_capacity(N);
    for _ in 0..N {
        let (sock, mut peer) = UnixStream::pair().unwrap();
        sock.set_nonblocking(true).unwrap();

        let op = poll.alloc();
        op.fd = sock.as_raw_fd();
        let mut buf = vec![0u8; 16];
        op.inputs = Some(Box::new(move |iovs: &mut [IoVec]| {
            iovs[0] = IoVec::from_mut(&mut buf[..]);
            1
        }));
        let total = total.clone();
        op.input_ack = Some(Box::new(move |n| {
            total.fetch_add(n, Ordering::SeqCst);
            Ok(())
        }));
        poll.control(op, PollEvent::Readable).unwrap();

        peer.write_all(b"x").unwrap();
        pairs.push((sock, peer));
    }

    // every event is already pending, so the first poll saturates the
    // initial event array and forces a regrow
    let reactor = start(&poll);

    let deadline = Instant::now() + Duration::from_secs(5);
    while total.load(Ordering::SeqCst) < N && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(total.load(Ordering::SeqCst), N);

    poll.close().unwrap();
    reactor.join().unwrap().unwrap();
}
