mod common;

use std::time::Duration;

use common::{eventually, FakeCapture, Gate, MemorySink, TIMEOUT};
use taperec::capture::CaptureSource;
use taperec::pipe::{PipeEnd, PipeReport, TransferError, TransferPipe};
use taperec::resource::ActorId;
use taperec::sink::SinkError;
use tokio::sync::mpsc;

struct Running {
    capture: std::sync::Arc<FakeCapture>,
    sink: std::sync::Arc<MemorySink>,
    pipe: taperec::pipe::PipeHandle,
    reports: mpsc::UnboundedReceiver<PipeReport>,
}

fn start(queue_depth: usize, sink: std::sync::Arc<MemorySink>) -> Running {
    let capture = FakeCapture::new(queue_depth);
    let chunks = capture.take_chunks().expect("chunk stream");
    let (tx, reports) = mpsc::unbounded_channel();
    let pipe = TransferPipe::spawn(ActorId::new(3), chunks, sink.clone(), move |report| {
        let _ = tx.send(report);
    });
    Running {
        capture,
        sink,
        pipe,
        reports,
    }
}

#[tokio::test]
async fn copies_chunks_in_order_and_closes_sink() {
    let mut run = start(4, MemorySink::new());
    assert!(run.capture.push(b"one "));
    assert!(run.capture.push(b"two "));
    assert!(run.capture.push(b"three"));
    run.capture.stop();

    let report = tokio::time::timeout(TIMEOUT, run.reports.recv()).await.expect("report");
    assert!(matches!(report, Some(PipeReport::Done { id }) if id == ActorId::new(3)));
    assert_eq!(run.sink.data(), b"one two three");
    assert_eq!(run.sink.chunks().len(), 3);
    assert!(run.sink.is_closed());

    let outcome = run.pipe.shutdown(Duration::from_millis(100)).await;
    assert_eq!(outcome.end, PipeEnd::Completed);
    assert_eq!(outcome.chunks, 3);
    assert_eq!(outcome.bytes, 13);
}

#[tokio::test]
async fn slow_sink_stalls_the_producer() {
    let gate = Gate::closed();
    let mut run = start(1, MemorySink::with_gate(gate.clone(), false));

    assert!(run.capture.push(b"a"));
    // The pipe pulls "a" and blocks writing it; one more fits the queue.
    eventually(|| run.capture.push(b"b")).await;
    assert!(!run.capture.push(b"c"), "queue should be full");

    gate.open();
    eventually(|| run.capture.push(b"c")).await;
    run.capture.stop();

    let report = tokio::time::timeout(TIMEOUT, run.reports.recv()).await.expect("report");
    assert!(matches!(report, Some(PipeReport::Done { .. })));
    assert_eq!(run.sink.data(), b"abc");
}

#[tokio::test]
async fn capture_fault_fails_transfer_and_aborts_sink() {
    let mut run = start(4, MemorySink::new());
    assert!(run.capture.push(b"partial"));
    run.capture.fail("device unplugged");

    let report = tokio::time::timeout(TIMEOUT, run.reports.recv()).await.expect("report");
    match report {
        Some(PipeReport::Error { cause: TransferError::Capture(err), .. }) => {
            assert!(err.to_string().contains("device unplugged"));
        }
        other => panic!("Expected capture error, got {other:?}"),
    }
    assert_eq!(run.sink.data(), b"partial");
    assert!(run.sink.aborted().is_some());

    let outcome = run.pipe.shutdown(Duration::from_millis(100)).await;
    assert_eq!(outcome.end, PipeEnd::Failed);
}

#[tokio::test]
async fn sink_rejection_fails_transfer() {
    let mut run = start(4, MemorySink::with_gate(Gate::opened(), true));
    assert!(run.capture.push(b"x"));

    let report = tokio::time::timeout(TIMEOUT, run.reports.recv()).await.expect("report");
    assert!(matches!(
        report,
        Some(PipeReport::Error { cause: TransferError::Sink(SinkError::Io(_)), .. })
    ));
}

#[tokio::test]
async fn shutdown_between_chunks_stops_without_report() {
    let mut run = start(4, MemorySink::new());
    assert!(run.capture.push(b"kept"));
    eventually(|| run.sink.chunks().len() == 1).await;

    let outcome = run.pipe.shutdown(Duration::from_millis(100)).await;
    assert_eq!(outcome.end, PipeEnd::Stopped);
    assert_eq!(outcome.chunks, 1);
    // Closing is left to the sink's owner.
    assert!(!run.sink.is_closed());
    assert!(run.reports.recv().await.is_none());
}

#[tokio::test]
async fn shutdown_aborts_a_write_that_outlives_the_grace_period() {
    let gate = Gate::closed();
    let mut run = start(4, MemorySink::with_gate(gate, false));
    assert!(run.capture.push(b"stuck"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    let outcome = run.pipe.shutdown(Duration::from_millis(50)).await;
    assert_eq!(outcome.end, PipeEnd::Aborted);
    assert_eq!(outcome.chunks, 0);
    assert_eq!(run.sink.aborted().as_deref(), Some("disposed while still writing"));
    assert!(run.reports.recv().await.is_none());
}
