//! End-to-end scan runs over real TCP connections into an in-memory sink.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ce_core::fingerprint::{Fingerprinter, Sha256Fingerprinter};
use ce_core::listener::{HandlerContext, ScanListener};
use ce_core::memory_sink::MemorySink;
use ce_core::metrics::FileLabels;

fn start(fingerprint: bool) -> (ScanListener, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let fingerprinter: Option<Arc<dyn Fingerprinter>> = if fingerprint {
        Some(Arc::new(Sha256Fingerprinter))
    } else {
        None
    };
    let listener = ScanListener::bind(
        "127.0.0.1:0",
        HandlerContext {
            sink: sink.clone(),
            fingerprinter,
        },
    )
    .unwrap();
    (listener, sink)
}

/// Poll `cond` until it holds or five seconds pass.
fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Send a whole run and close the write side.
fn send_run(listener: &ScanListener, body: &str) {
    let mut stream = TcpStream::connect(listener.addr()).unwrap();
    stream.write_all(body.as_bytes()).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();
}

#[test]
fn mixed_run_is_published() {
    let (listener, sink) = start(false);
    send_run(
        &listener,
        "/tmp/a.txt: OK\n/tmp/b.txt: OK\n/tmp/c.txt: Eicar-Test-SignatureFOUND\nCan't open file /tmp/d.txt: ERROR\n",
    );
    wait_for("published run", || sink.finished_runs() == 1);

    assert_eq!(sink.value(&FileLabels::result("OK")), Some(2.0));
    assert_eq!(
        sink.value(&FileLabels::found("Eicar-Test-Signature", "/tmp/c.txt", "")),
        Some(1.0)
    );
    assert_eq!(sink.series().len(), 2);
    assert_eq!(sink.lines("error"), 1);

    let report = listener.shutdown(Duration::from_secs(2));
    assert_eq!(report.abandoned, 0);
}

#[test]
fn unterminated_last_line_counts() {
    let (listener, sink) = start(false);
    send_run(&listener, "/a: OK\r\n/b: Empty file");
    wait_for("published run", || sink.finished_runs() == 1);

    assert_eq!(sink.value(&FileLabels::result("OK")), Some(1.0));
    assert_eq!(sink.value(&FileLabels::result("Empty file")), Some(1.0));
    listener.shutdown(Duration::from_secs(2));
}

#[test]
fn infected_file_digest_is_labelled() {
    let dir = tempfile::tempdir().unwrap();
    let infected = dir.path().join("sample.bin");
    std::fs::write(&infected, b"abc").unwrap();
    let path = infected.display().to_string();

    let (listener, sink) = start(true);
    send_run(&listener, &format!("{path}: Eicar-Signature FOUND\n/gone: Other FOUND\n"));
    wait_for("published run", || sink.finished_runs() == 1);

    assert_eq!(
        sink.value(&FileLabels::found(
            "Eicar-Signature",
            &path,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        )),
        Some(1.0)
    );
    assert_eq!(sink.value(&FileLabels::found("Other", "/gone", "")), Some(1.0));
    assert_eq!(sink.fingerprint_errors(), 1);
    listener.shutdown(Duration::from_secs(2));
}

#[test]
fn concurrent_runs_do_not_share_counts() {
    let (listener, sink) = start(false);

    // First run stays open while a second one completes.
    let mut slow = TcpStream::connect(listener.addr()).unwrap();
    slow.write_all(b"/slow: OK\n").unwrap();
    wait_for("first connection", || sink.connections() == 1);

    send_run(&listener, "/fast/1: OK\n/fast/2: OK\n/fast/3: OK\n");
    wait_for("second run", || sink.finished_runs() == 1);
    assert_eq!(sink.value(&FileLabels::result("OK")), Some(3.0));

    slow.shutdown(Shutdown::Write).unwrap();
    wait_for("first run", || sink.finished_runs() == 2);
    // Last publisher wins, and it only ever saw its own line.
    assert_eq!(sink.value(&FileLabels::result("OK")), Some(1.0));
    assert_eq!(sink.set_calls(), 2);

    listener.shutdown(Duration::from_secs(2));
}

#[test]
fn shutdown_waits_for_open_runs() {
    let (listener, sink) = start(false);
    let mut stream = TcpStream::connect(listener.addr()).unwrap();
    stream.write_all(b"/a: OK\n").unwrap();
    wait_for("connection", || sink.connections() == 1);

    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        stream.write_all(b"/b: OK\n").unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
    });

    let report = listener.shutdown(Duration::from_secs(5));
    closer.join().unwrap();

    assert_eq!(report.abandoned, 0);
    assert_eq!(sink.value(&FileLabels::result("OK")), Some(2.0));
}

#[test]
fn straggler_is_abandoned_after_grace() {
    let (listener, sink) = start(false);
    let mut stream = TcpStream::connect(listener.addr()).unwrap();
    stream.write_all(b"/a: OK\n").unwrap();
    wait_for("connection", || sink.connections() == 1);
    assert_eq!(listener.in_flight(), 1);

    let report = listener.shutdown(Duration::from_millis(200));
    assert_eq!(report.abandoned, 1);
    assert!(report.waited >= Duration::from_millis(200));

    // Force-closing ends the read; what was received is still published.
    wait_for("abandoned run", || sink.finished_runs() == 1);
    assert_eq!(sink.value(&FileLabels::result("OK")), Some(1.0));
    drop(stream);
}

#[test]
fn no_connections_after_shutdown() {
    let (listener, sink) = start(false);
    let addr = listener.addr();
    listener.shutdown(Duration::from_millis(100));

    assert!(TcpStream::connect(addr).is_err());
    assert_eq!(sink.connections(), 0);
}
