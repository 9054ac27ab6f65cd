#[macro_use]
extern crate log;
extern crate env_logger;

extern crate woliu;

use std::io::{self, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex};

use woliu::poll::{IoVec, PollEvent, Poller};

fn serve(poll: &Poller, sock: TcpStream) -> io::Result<()> {
    // Disable Nagle's algorithm
    sock.set_nodelay(true)?;
    sock.set_nonblocking(true)?;

    let op = poll.alloc();
    op.fd = sock.as_raw_fd();

    let buf = Arc::new(Mutex::new(vec![0u8; 16 * 1024]));
    let fill = buf.clone();
    op.inputs = Some(Box::new(move |iovs: &mut [IoVec]| {
        let mut buf = fill.lock().unwrap();
        iovs[0] = IoVec::from_mut(&mut buf[..]);
        1
    }));

    // Send whatever was received back to the client
    let mut writer = sock.try_clone()?;
    op.input_ack = Some(Box::new(move |n| {
        if n > 0 {
            let buf = buf.lock().unwrap();
            writer.write_all(&buf[..n])?;
        }
        Ok(())
    }));

    // The stream is parked here so the fd stays open until hang-up
    let mut held = Some(sock);
    op.on_hup = Some(Box::new(move |_: &Poller| {
        held.take();
        Ok(())
    }));

    op.control(PollEvent::Readable)
}

fn main() {
    env_logger::init();

    let listener = TcpListener::bind("127.0.0.1:10007").unwrap();
    listener.set_nonblocking(true).unwrap();

    let poll = Poller::new().unwrap();
    let lop = poll.alloc();
    lop.fd = listener.as_raw_fd();
    lop.on_read = Some(Box::new(move |p: &Poller| {
        loop {
            match listener.accept() {
                Ok((sock, addr)) => {
                    info!("accepted {}", addr);
                    serve(p, sock)?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }));
    poll.control(lop, PollEvent::Readable).unwrap();

    info!("echo server listening on 127.0.0.1:10007");
    poll.wait().unwrap();
}
