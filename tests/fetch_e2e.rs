//! Fetch workflows against miniature response servers, driven by the full
//! reactor loop.

use miniloop::{Backend, FetchResult, FetchTarget, PendingSet, Phase, Runtime, RuntimeBuilder, fetch};

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const HEADER: &[u8] = b"header\r\n\r\n";
const BODY_LEN: usize = 500;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn read_request(stream: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];

    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "client closed before finishing its request");
        request.extend_from_slice(&buf[..n]);
    }

    assert!(request.starts_with(b"GET "));
}

/// Serves one request: 10-byte header, then the body, then an orderly close.
fn spawn_server(body: Vec<u8>) -> (SocketAddr, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);

        stream.write_all(HEADER).unwrap();
        stream.write_all(&body).unwrap();
    });

    (addr, handle)
}

/// Serves one request but resets the connection after a partial body.
fn spawn_resetting_server(partial: Vec<u8>) -> (SocketAddr, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);

        stream.write_all(HEADER).unwrap();
        stream.write_all(&partial).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(300));

        let linger = libc::linger {
            l_onoff: 1,
            l_linger: 0,
        };
        unsafe {
            use std::os::unix::io::AsRawFd;
            libc::setsockopt(
                stream.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_LINGER,
                &linger as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::linger>() as libc::socklen_t,
            );
        }
    });

    (addr, handle)
}

/// An address that refuses connections: bind, record, drop.
fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn run_fetches(mut rt: Runtime, targets: Vec<FetchTarget>) -> (Vec<FetchResult>, PendingSet) {
    let pending = PendingSet::new(rt.stop_token());
    let results: Arc<Mutex<Vec<FetchResult>>> = Arc::new(Mutex::new(Vec::new()));

    for target in targets {
        let pending = pending.clone();
        let results = results.clone();
        rt.spawn(async move {
            let result = fetch(target, pending).await;
            results.lock().unwrap().push(result);
        });
    }

    rt.run().unwrap();

    let results = Arc::try_unwrap(results)
        .unwrap_or_else(|_| panic!("a task outlived the loop"))
        .into_inner()
        .unwrap();

    (results, pending)
}

#[test]
fn concurrent_fetches_complete_on_every_backend() {
    init_logs();

    for backend in [Backend::Select, Backend::Poll, Backend::Epoll] {
        let servers: Vec<_> = (0..3)
            .map(|i| spawn_server(vec![b'a' + i as u8; BODY_LEN]))
            .collect();

        let rt = RuntimeBuilder::new().backend(backend).build().unwrap();
        let stop = rt.stop_token();

        let targets = servers
            .iter()
            .enumerate()
            .map(|(i, (addr, _))| FetchTarget::new(*addr, format!("server{i}"), "/"))
            .collect();

        let (results, pending) = run_fetches(rt, targets);

        assert_eq!(results.len(), 3, "backend {backend:?}");
        for result in &results {
            assert_eq!(result.phase, Phase::Done, "backend {backend:?}");
            assert!(result.error.is_none());
            assert_eq!(result.body.len(), BODY_LEN);
            assert!(result.body.iter().all(|&b| b == result.body[0]));
        }

        // Each server got a distinct body; all three must be present.
        let mut first_bytes: Vec<u8> = results.iter().map(|r| r.body[0]).collect();
        first_bytes.sort_unstable();
        assert_eq!(first_bytes, vec![b'a', b'b', b'c']);

        assert!(pending.is_empty());
        assert!(stop.is_set(), "the last fetch must fire the stop token");

        for (_, handle) in servers {
            handle.join().unwrap();
        }
    }
}

#[test]
fn reset_after_partial_body_still_completes() {
    init_logs();

    const PARTIAL: usize = 200;
    let (addr, server) = spawn_resetting_server(vec![b'p'; PARTIAL]);

    let rt = Runtime::new();
    let targets = vec![FetchTarget::new(addr, "resetting", "/")];
    let (results, pending) = run_fetches(rt, targets);

    server.join().unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];

    // The reset reads like a close, so the workflow finishes with the body
    // bytes that made it across.
    assert_eq!(result.phase, Phase::Done);
    assert!(result.error.is_none());
    assert_eq!(result.body, vec![b'p'; PARTIAL]);
    assert!(pending.is_empty());
}

#[test]
fn failed_fetch_does_not_disturb_its_siblings() {
    init_logs();

    let (good_addr_a, server_a) = spawn_server(vec![b'x'; BODY_LEN]);
    let (good_addr_b, server_b) = spawn_server(vec![b'y'; BODY_LEN]);
    let bad_addr = refused_addr();

    let rt = Runtime::new();
    let targets = vec![
        FetchTarget::new(good_addr_a, "good-a", "/"),
        FetchTarget::new(bad_addr, "bad", "/"),
        FetchTarget::new(good_addr_b, "good-b", "/"),
    ];
    let (results, pending) = run_fetches(rt, targets);

    server_a.join().unwrap();
    server_b.join().unwrap();

    assert_eq!(results.len(), 3);

    let failed: Vec<_> = results.iter().filter(|r| r.phase == Phase::Errored).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].target.host, "bad");
    assert!(failed[0].error.is_some());

    let done: Vec<_> = results.iter().filter(|r| r.phase == Phase::Done).collect();
    assert_eq!(done.len(), 2);
    for result in done {
        assert_eq!(result.body.len(), BODY_LEN);
        assert!(result.error.is_none());
    }

    assert!(pending.is_empty());
}
