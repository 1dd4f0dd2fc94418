use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;

use pollws::endpoint::Endpoint;
use pollws::frame::{Frame, OpCode};
use pollws::role::Role;
use pollws::settings::Settings;

const ADDR: &str = "127.0.0.1";
const PORT: u16 = 18231;
const ECHO_DATA: &[u8] = b"ECHO ECHO ECHO!";
const ROUNDS: usize = 5;

fn server_settings() -> Settings {
    Settings {
        endpoint: Role::Server,
        poll_timeout: 20,
        ..Settings::default()
    }
}

fn client_settings() -> Settings {
    Settings {
        endpoint: Role::Client,
        host: "www.example.com".into(),
        poll_timeout: 20,
        ..Settings::default()
    }
}

#[test]
fn endpoint_echo() {
    let _ = env_logger::builder().is_test(true).try_init();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_server = stop.clone();

    let server = thread::spawn(move || {
        let mut ep = Endpoint::new(server_settings()).unwrap();
        ep.bind(Some(ADDR), PORT).unwrap();

        ep.on_frame(|ctl, fd, opcode, payload| {
            debug!("server: echo {} bytes", payload.len());
            let mut frame = Frame::new(opcode);
            frame.push(payload);
            ctl.emit(fd, frame);
        });

        while !stop_server.load(Ordering::Relaxed) {
            ep.operate();
        }
    });

    let client = thread::spawn(move || {
        // give the listener a moment
        thread::sleep(Duration::from_millis(200));

        let mut ep = Endpoint::new(client_settings()).unwrap();
        ep.open(ADDR, PORT).unwrap();

        let received: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
        let done = Rc::new(RefCell::new(false));

        ep.on_open(|ctl, fd, addr| {
            debug!("client: open, peer {}", addr);
            let mut frame = Frame::new(OpCode::Text);
            frame.push(ECHO_DATA);
            ctl.emit(fd, frame);
        });

        let received_in = received.clone();
        ep.on_frame(move |ctl, fd, opcode, payload| {
            assert_eq!(opcode, OpCode::Text);
            let mut log = received_in.borrow_mut();
            log.push(payload.to_vec());
            debug!("client: round {} echoed", log.len());
            if log.len() == ROUNDS {
                ctl.close(fd);
            } else {
                let mut frame = Frame::new(OpCode::Text);
                frame.push(ECHO_DATA);
                ctl.emit(fd, frame);
            }
        });

        let done_in = done.clone();
        ep.on_close(move |_ctl, _fd, code| {
            debug!("client: closed with {}", code);
            *done_in.borrow_mut() = true;
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !*done.borrow() {
            assert!(std::time::Instant::now() < deadline, "echo timed out");
            if !ep.operate() {
                break;
            }
        }

        let received = received.borrow();
        assert_eq!(received.len(), ROUNDS);
        for payload in received.iter() {
            assert_eq!(payload, ECHO_DATA);
        }
    });

    client.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    server.join().unwrap();
}
