use pipenet::base::loadstate::LoadState;
use pipenet::base::neterror::NetError;
use pipenet::http::config::PipelineConfig;
use pipenet::http::exchange::lock;
use pipenet::http::pipeline::{DriveStatus, Pipeline, SendState};
use pipenet::http::request::HttpRequest;
use pipenet::http::requestbody::{BodySource, BytesBody};
use pipenet::http::response::HttpResponse;
use pipenet::http::retry::MAX_RETRY_AFTER;
use pipenet::http::sink::{CollectSink, DataAction, HeaderAction, ResponseSink};
use pipenet::http::throttle::RequestThrottler;
use pipenet::http::{RequestResponse, SharedExchange};
use pipenet::socket::mock::ScriptedTransport;
use pipenet::socket::transport::Transport;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn pipeline() -> Pipeline<ScriptedTransport> {
    Pipeline::new(ScriptedTransport::new(), Arc::new(RequestThrottler::new()))
}

fn get(url: &str, keep_alive: bool) -> (SharedExchange, CollectSink) {
    let mut request = HttpRequest::get(url).unwrap();
    if keep_alive {
        request.set_header("Connection", "keep-alive").unwrap();
    }
    let sink = CollectSink::new();
    let exchange = RequestResponse::new(request, HttpResponse::with_sink(sink.clone())).shared();
    (exchange, sink)
}

/// Drive until the pipeline stops asking to be driven again.
fn run(p: &mut Pipeline<ScriptedTransport>) -> Result<DriveStatus, NetError> {
    for _ in 0..100_000 {
        match p.drive()? {
            DriveStatus::Continue => continue,
            other => return Ok(other),
        }
    }
    panic!("pipeline did not settle");
}

/// Records every callback it receives.
#[derive(Clone, Default)]
struct RecordingSink {
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
    on_header: Option<HeaderAction>,
    abort_data: bool,
}

impl RecordingSink {
    fn returning(action: HeaderAction) -> Self {
        Self {
            on_header: Some(action),
            ..Self::default()
        }
    }

    fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }
}

impl ResponseSink for RecordingSink {
    fn on_header(&mut self, _request: &HttpRequest, _response: &HttpResponse) -> HeaderAction {
        self.on_header.unwrap_or(HeaderAction::Continue)
    }

    fn on_data(&mut self, data: &[u8]) -> DataAction {
        self.chunks.lock().unwrap().push(data.to_vec());
        if self.abort_data {
            DataAction::Abort
        } else {
            DataAction::Continue
        }
    }
}

#[test]
fn test_fixed_length_response() {
    let mut p = pipeline();
    let sink = RecordingSink::default();
    let request = HttpRequest::get("http://example.com/x").unwrap();
    let exchange = RequestResponse::new(request, HttpResponse::with_sink(sink.clone())).shared();
    p.enqueue(exchange.clone());
    assert_eq!(p.load_state(), LoadState::Connecting);

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert!(p
        .transport()
        .written_str()
        .starts_with("GET /x HTTP/1.1\r\n"));
    assert_eq!(p.load_state(), LoadState::WaitingForResponse);

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);

    assert_eq!(sink.chunks(), vec![b"hello".to_vec()]);
    let rr = lock(&exchange);
    assert!(rr.is_complete());
    assert_eq!(rr.response.code(), 200);
    assert_eq!(rr.response.reason(), "OK");
    // The request asked to close, so the connection is not kept.
    assert!(!p.transport().is_connected());
}

#[test]
fn test_chunked_response() {
    let mut p = pipeline();
    let (exchange, sink) = get("http://example.com/", false);
    p.enqueue(exchange.clone());
    run(&mut p).unwrap();

    p.transport_mut().push_data(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nwiki\r\n0\r\n\r\n",
    );
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(&sink.body()[..], b"wiki");
    assert!(lock(&exchange).is_complete());
}

#[test]
fn test_too_many_requests_defaults_to_one_second() {
    let throttler = Arc::new(RequestThrottler::new());
    let mut p = Pipeline::new(ScriptedTransport::new(), throttler.clone());
    let (exchange, _) = get("http://example.com/", false);
    p.enqueue(exchange.clone());
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 429 Too Many Requests\r\n\r\n");
    p.transport_mut().push_eof();
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);

    let backoff = throttler.get_throttle("example.com");
    assert!(backoff > Duration::from_millis(500), "{:?}", backoff);
    assert!(backoff <= Duration::from_secs(1));
    assert_eq!(throttler.get_throttle("other.example"), Duration::ZERO);
    assert_eq!(lock(&exchange).response.code(), 429);
}

#[test]
fn test_closing_request_holds_next_one() {
    let mut p = pipeline();
    let (a, sink_a) = get("http://example.com/a", false);
    let (b, sink_b) = get("http://example.com/b", false);
    p.enqueue(a);
    p.enqueue(b.clone());

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.send_state(), SendState::WaitBeforeSend);
    let first = p.transport_mut().take_written();
    assert!(first.starts_with(b"GET /a "));
    assert!(!String::from_utf8_lossy(&first).contains("GET /b"));
    assert!(!lock(&b).request.flags().header_sent);

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nhi");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.transport().resets(), 1);
    assert_eq!(p.transport().connects().len(), 2);
    assert!(p.transport().written_str().starts_with("GET /b "));

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nbye");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(&sink_a.body()[..], b"hi");
    assert_eq!(&sink_b.body()[..], b"bye");
}

#[test]
fn test_bad_chunk_size_never_delivers() {
    let mut p = pipeline();
    let (exchange, sink) = get("http://example.com/", false);
    p.enqueue(exchange.clone());
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nwiki\r\n0\r\n\r\n");
    assert_eq!(run(&mut p), Err(NetError::InvalidChunkedEncoding));
    assert!(sink.is_empty());
    assert!(!lock(&exchange).is_complete());
    assert!(p.is_complete());
}

#[test]
fn test_keep_alive_requests_are_pipelined() {
    let mut p = pipeline();
    let pairs: Vec<_> = ["/1", "/2", "/3"]
        .iter()
        .map(|path| get(&format!("http://example.com{}", path), true))
        .collect();
    for (exchange, _) in &pairs {
        p.enqueue(exchange.clone());
    }

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    let written = p.transport().written_str();
    let order: Vec<_> = written
        .lines()
        .filter(|line| line.starts_with("GET "))
        .collect();
    assert_eq!(
        order,
        vec!["GET /1 HTTP/1.1", "GET /2 HTTP/1.1", "GET /3 HTTP/1.1"]
    );
    assert_eq!(p.transport().connects().len(), 3);
    assert_eq!(p.send_state(), SendState::Idle);

    p.transport_mut().push_data(
        b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\none\
          HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\ntwo\r\n0\r\n\r\n\
          HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nthree",
    );
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);

    let bodies: Vec<_> = pairs.iter().map(|(_, sink)| sink.body()).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
    assert!(pairs.iter().all(|(e, _)| lock(e).is_complete()));
    // All three rode the same connection, which stays open.
    assert_eq!(p.transport().resets(), 0);
    assert!(p.transport().is_connected());
}

#[test]
fn test_single_byte_reads() {
    let mut p = pipeline();
    let (a, sink_a) = get("http://example.com/a", true);
    let (b, sink_b) = get("http://example.com/b", true);
    p.enqueue(a);
    p.enqueue(b.clone());
    run(&mut p).unwrap();

    p.transport_mut().push_bytewise(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
          5;name=value\r\nhello\r\n6\r\n world\r\n0\r\nX-Checksum: 1\r\n\r\n\
          HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone",
    );
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(&sink_a.body()[..], b"hello world");
    assert_eq!(&sink_b.body()[..], b"done");
    assert_eq!(p.transport().pending_reads(), 0);
}

#[test]
fn test_excess_data_after_last_response() {
    let mut p = pipeline();
    let (exchange, _) = get("http://example.com/", true);
    p.enqueue(exchange);
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhiEXTRA");
    assert_eq!(run(&mut p), Err(NetError::ExcessResponseData));
    assert!(!p.transport().is_connected());
}

#[test]
fn test_excess_data_before_close() {
    let mut p = pipeline();
    let (a, _) = get("http://example.com/a", false);
    let (b, _) = get("http://example.com/b", false);
    p.enqueue(a);
    p.enqueue(b);
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhiHTTP/1.1");
    assert_eq!(run(&mut p), Err(NetError::ExcessResponseData));
}

#[test]
fn test_premature_eof() {
    let cases: [(&[u8], NetError); 4] = [
        (b"", NetError::EmptyResponse),
        (b"HTTP/1.1 200 OK\r\nContent-", NetError::ConnectionClosed),
        (
            b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort",
            NetError::ContentLengthMismatch,
        ),
        (
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n10\r\npart",
            NetError::IncompleteChunkedEncoding,
        ),
    ];

    for (input, expected) in cases {
        let mut p = pipeline();
        let (exchange, _) = get("http://example.com/", false);
        p.enqueue(exchange);
        run(&mut p).unwrap();

        if !input.is_empty() {
            p.transport_mut().push_data(input);
        }
        p.transport_mut().push_eof();
        assert_eq!(run(&mut p), Err(expected));
        assert!(expected.is_disconnect() || expected.is_protocol_error());
    }
}

#[test]
fn test_read_until_close() {
    let mut p = pipeline();
    let (exchange, sink) = get("http://example.com/", true);
    p.enqueue(exchange.clone());
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.0 200 OK\r\n\r\nstreamed ");
    p.transport_mut().push_would_block();
    p.transport_mut().push_data(b"until close");
    p.transport_mut().push_eof();

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(&sink.body()[..], b"streamed ");
    assert!(!lock(&exchange).is_complete());

    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(&sink.body()[..], b"streamed until close");
    assert!(lock(&exchange).is_complete());
}

#[test]
fn test_bad_chunk_terminator() {
    let mut p = pipeline();
    let (exchange, sink) = get("http://example.com/", false);
    p.enqueue(exchange);
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nwikiX\r\n0\r\n\r\n");
    assert_eq!(run(&mut p), Err(NetError::InvalidChunkedEncoding));
    // The chunk itself was framed correctly and was delivered.
    assert_eq!(&sink.body()[..], b"wiki");
}

#[test]
fn test_head_then_get_on_same_connection() {
    let mut p = pipeline();
    let head = HttpRequest::new("HEAD", "http://example.com/file")
        .unwrap()
        .with_header("Connection", "keep-alive")
        .unwrap();
    let head_sink = CollectSink::new();
    let head_pair =
        RequestResponse::new(head, HttpResponse::with_sink(head_sink.clone())).shared();
    let (get_pair, get_sink) = get("http://example.com/file", true);
    p.enqueue(head_pair.clone());
    p.enqueue(get_pair);
    run(&mut p).unwrap();

    p.transport_mut().push_data(
        b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\n\
          HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody",
    );
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert!(head_sink.is_empty());
    assert!(lock(&head_pair).response.flags().no_body);
    assert_eq!(lock(&head_pair).response.header("Content-Length"), Some("4"));
    assert_eq!(&get_sink.body()[..], b"body");
}

#[test]
fn test_no_content_and_interim_responses() {
    let mut p = pipeline();
    let (a, sink_a) = get("http://example.com/a", true);
    let (b, sink_b) = get("http://example.com/b", true);
    p.enqueue(a.clone());
    p.enqueue(b);
    run(&mut p).unwrap();

    p.transport_mut().push_data(
        b"HTTP/1.1 204 No Content\r\n\r\n\
          HTTP/1.1 100 Continue\r\n\r\n\
          HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    );
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert!(sink_a.is_empty());
    assert_eq!(lock(&a).response.code(), 204);
    assert_eq!(&sink_b.body()[..], b"ok");
}

#[test]
fn test_stop_drains_body() {
    let mut p = pipeline();
    let stopper = RecordingSink::returning(HeaderAction::Stop);
    let request = HttpRequest::get("http://example.com/big")
        .unwrap()
        .with_header("Connection", "keep-alive")
        .unwrap();
    let stopped = RequestResponse::new(request, HttpResponse::with_sink(stopper.clone())).shared();
    let (next, next_sink) = get("http://example.com/next", true);
    p.enqueue(stopped.clone());
    p.enqueue(next.clone());
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nabc");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.load_state(), LoadState::ReadingResponse);

    p.transport_mut()
        .push_data(b"defHTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nnext");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);

    assert!(stopper.chunks().is_empty());
    let rr = lock(&stopped);
    assert!(rr.response.flags().got_header);
    assert!(!rr.is_complete());
    assert_eq!(&next_sink.body()[..], b"next");
    assert!(lock(&next).is_complete());
}

#[test]
fn test_reject_fails_exchange() {
    let mut p = pipeline();
    let sink = RecordingSink::returning(HeaderAction::Reject);
    let request = HttpRequest::get("http://example.com/").unwrap();
    let exchange = RequestResponse::new(request, HttpResponse::with_sink(sink.clone())).shared();
    p.enqueue(exchange.clone());
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 4\r\n\r\nnope");
    assert_eq!(run(&mut p), Err(NetError::ResponseRejected));
    assert!(sink.chunks().is_empty());
    assert!(lock(&exchange).response.flags().ignore_body);
    assert!(p.is_complete());
}

#[test]
fn test_error_body_delivery() {
    let mut p = pipeline();
    let plain = CollectSink::new();
    let opted_in = CollectSink::with_error_body();
    for sink in [&plain, &opted_in] {
        let request = HttpRequest::get("http://example.com/missing")
            .unwrap()
            .with_header("Connection", "keep-alive")
            .unwrap();
        p.enqueue(RequestResponse::new(request, HttpResponse::with_sink(sink.clone())).shared());
    }
    run(&mut p).unwrap();

    p.transport_mut().push_data(
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found\
          HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\n\r\nnot found",
    );
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(&plain.body()[..], b"not found");
    assert!(!plain.is_error_body());
    assert_eq!(&opted_in.body()[..], b"not found");
    assert!(opted_in.is_error_body());
}

#[test]
fn test_sink_abort() {
    let mut p = pipeline();
    let sink = RecordingSink {
        abort_data: true,
        ..RecordingSink::default()
    };
    let request = HttpRequest::get("http://example.com/").unwrap();
    p.enqueue(RequestResponse::new(request, HttpResponse::with_sink(sink.clone())).shared());
    run(&mut p).unwrap();

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndata");
    assert_eq!(run(&mut p), Err(NetError::Aborted));
    assert_eq!(sink.chunks().len(), 1);
}

#[test]
fn test_upload_with_partial_writes() {
    let config = PipelineConfig {
        send_chunk_size: 512,
        ..PipelineConfig::default()
    };
    let mut p = Pipeline::with_config(
        ScriptedTransport::new(),
        Arc::new(RequestThrottler::new()),
        config,
    );
    p.transport_mut().limit_writes(300);

    let payload: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
    let request = HttpRequest::new("PUT", "http://example.com/upload")
        .unwrap()
        .with_body(BytesBody::from(payload.clone()));
    let exchange = RequestResponse::new(request, HttpResponse::new()).shared();
    p.enqueue(exchange.clone());

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    let written = p.transport().written().to_vec();
    let split = written
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap()
        + 4;
    let head = String::from_utf8_lossy(&written[..split]);
    assert!(head.starts_with("PUT /upload HTTP/1.1\r\n"));
    assert!(head.contains("Content-Length: 2000\r\n"));
    assert_eq!(&written[split..], &payload[..]);

    // Coalescing is switched off for the upload and back on after it.
    assert_eq!(p.transport().nodelay_calls(), &[false, true]);
    assert!(lock(&exchange).request.flags().body_sent);
    assert_eq!(p.load_state(), LoadState::WaitingForResponse);

    p.transport_mut()
        .push_data(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(lock(&exchange).response.code(), 201);
}

/// A source that misreports how much it wrote.
struct LyingBody {
    size: u64,
    report: usize,
}

impl BodySource for LyingBody {
    fn size(&self) -> u64 {
        self.size
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        Ok(if self.report == 0 { 0 } else { buf.len() + self.report })
    }

    fn rewind(&mut self) -> Result<(), NetError> {
        Ok(())
    }
}

#[test]
fn test_body_source_misbehaving() {
    for (report, expected) in [(1, NetError::UploadBodyOverrun), (0, NetError::UploadFileChanged)] {
        let mut p = pipeline();
        let request = HttpRequest::new("POST", "http://example.com/")
            .unwrap()
            .with_body(LyingBody { size: 4, report });
        let exchange = RequestResponse::new(request, HttpResponse::new()).shared();
        p.enqueue(exchange.clone());
        assert_eq!(run(&mut p), Err(expected));
        assert!(!lock(&exchange).request.flags().body_sent);
    }
}

#[test]
fn test_non_rewindable_body_cannot_resend() {
    struct OneShot(bool);
    impl BodySource for OneShot {
        fn size(&self) -> u64 {
            1
        }
        fn fill(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
            if self.0 {
                return Ok(0);
            }
            self.0 = true;
            buf[0] = b'x';
            Ok(1)
        }
    }

    let mut p = pipeline();
    let (a, _) = get("http://example.com/a", true);
    let request = HttpRequest::new("POST", "http://example.com/b")
        .unwrap()
        .with_header("Connection", "keep-alive")
        .unwrap()
        .with_body(OneShot(false));
    p.enqueue(a);
    p.enqueue(RequestResponse::new(request, HttpResponse::new()).shared());
    run(&mut p).unwrap();

    // Closing after the first response forces the upload onto a new connection.
    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(run(&mut p), Err(NetError::UploadStreamRewindNotSupported));
}

#[test]
fn test_response_close_resends_pipelined_requests() {
    let mut p = pipeline();
    let (a, sink_a) = get("http://example.com/a", true);
    let (b, sink_b) = get("http://example.com/b", true);
    p.enqueue(a);
    p.enqueue(b.clone());
    run(&mut p).unwrap();
    let first = p.transport_mut().take_written();
    assert!(String::from_utf8_lossy(&first).contains("GET /b "));

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 1\r\n\r\na");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.transport().resets(), 1);
    assert!(p.transport().written_str().starts_with("GET /b "));
    assert!(!lock(&b).response.flags().got_header);

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(&sink_a.body()[..], b"a");
    assert_eq!(&sink_b.body()[..], b"b");
}

#[test]
fn test_switching_host_waits_for_responses() {
    let mut p = pipeline();
    let (a, _) = get("http://a.example/", true);
    let (b, sink_b) = get("http://b.example/", true);
    p.enqueue(a);
    p.enqueue(b);

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.send_state(), SendState::WaitConnect);
    let connects = p.transport().connects().to_vec();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1].0.host, "b.example");
    assert!(!connects[1].1);
    assert_eq!(p.transport().written_str().matches("GET ").count(), 1);

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    let last = p.transport().connects().last().cloned().unwrap();
    assert_eq!(last.0.host, "b.example");
    assert!(last.1);
    assert!(p.transport().written_str().contains("Host: b.example\r\n"));

    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert_eq!(&sink_b.body()[..], b"b");
}

#[test]
fn test_retry_after_suspends_host() {
    let throttler = Arc::new(RequestThrottler::new());
    let mut p = Pipeline::new(ScriptedTransport::new(), throttler.clone());
    let (a, _) = get("http://example.com/a", false);
    p.enqueue(a);
    run(&mut p).unwrap();
    p.transport_mut()
        .push_data(b"HTTP/1.1 503 Service Unavailable\r\nRetry-After: 120\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);

    let before = Instant::now();
    let (b, _) = get("http://example.com/b", false);
    p.enqueue(b.clone());
    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.load_state(), LoadState::WaitingForBackoff);
    assert!(!lock(&b).request.flags().header_sent);

    let wake = p.next_wakeup().unwrap();
    assert!(wake > before + Duration::from_secs(100));
    assert!(wake <= before + Duration::from_secs(121));
    assert_eq!(p.transport().connects().len(), 1);
    assert!(!p.interest().writable);
}

#[test]
fn test_huge_retry_after_is_clamped() {
    let throttler = Arc::new(RequestThrottler::new());
    let mut p = Pipeline::new(ScriptedTransport::new(), throttler.clone());
    let (a, _) = get("http://example.com/a", false);
    p.enqueue(a.clone());
    run(&mut p).unwrap();
    p.transport_mut().push_data(
        b"HTTP/1.1 503 Busy\r\nRetry-After: 9223372036854775807\r\nContent-Length: 0\r\n\r\n",
    );
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert!(lock(&a).is_complete());

    let backoff = throttler.get_throttle("example.com");
    assert!(backoff > Duration::from_secs(3600));
    assert!(backoff <= MAX_RETRY_AFTER);
}

#[test]
fn test_throttle_is_per_host() {
    let throttler = Arc::new(RequestThrottler::new());
    throttler.throttle("slow.example", Instant::now() + Duration::from_secs(60));
    let mut p = Pipeline::new(ScriptedTransport::new(), throttler);

    let (exchange, _) = get("http://fast.example/", false);
    p.enqueue(exchange);
    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert!(p.next_wakeup().is_none());
    assert!(p.transport().written_str().starts_with("GET / "));
}

#[test]
fn test_idle_connection_eof() {
    let mut p = pipeline();
    let (exchange, _) = get("http://example.com/", true);
    p.enqueue(exchange);
    run(&mut p).unwrap();
    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);
    assert!(p.transport().is_connected());

    assert_eq!(p.drive().unwrap(), DriveStatus::Done);
    assert!(p.transport().is_connected());

    p.transport_mut().push_eof();
    assert_eq!(p.drive().unwrap(), DriveStatus::Done);
    assert!(!p.transport().is_connected());
}

#[test]
fn test_idle_connection_unexpected_data() {
    let mut p = pipeline();
    let (exchange, _) = get("http://example.com/", true);
    p.enqueue(exchange);
    run(&mut p).unwrap();
    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    run(&mut p).unwrap();

    p.transport_mut().push_data(b"surprise");
    assert_eq!(p.drive().unwrap(), DriveStatus::Done);
    assert!(!p.transport().is_connected());
}

#[test]
fn test_read_error_aborts() {
    let mut p = pipeline();
    let (exchange, _) = get("http://example.com/", false);
    p.enqueue(exchange.clone());
    run(&mut p).unwrap();

    p.transport_mut().push_error(ErrorKind::ConnectionReset);
    assert_eq!(run(&mut p), Err(NetError::ConnectionReset));
    assert!(p.is_complete());
    assert!(lock(&exchange).request.flags().header_sent);
}

#[test]
fn test_pending_connect() {
    let mut p = pipeline();
    p.transport_mut().delay_connects(1);
    let (exchange, _) = get("http://example.com/", false);
    p.enqueue(exchange);

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.load_state(), LoadState::Connecting);
    assert!(p.transport().written().is_empty());

    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    assert_eq!(p.load_state(), LoadState::WaitingForResponse);
    assert!(!p.transport().written().is_empty());
}

#[test]
fn test_unsupported_transfer_encoding() {
    let mut p = pipeline();
    let (exchange, _) = get("http://example.com/", false);
    p.enqueue(exchange);
    run(&mut p).unwrap();
    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n");
    assert_eq!(run(&mut p), Err(NetError::UnsupportedTransferEncoding));
}

#[test]
fn test_reuse_after_completion() {
    let mut p = pipeline();
    let (a, _) = get("http://example.com/a", true);
    p.enqueue(a);
    run(&mut p).unwrap();
    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);

    let (b, sink_b) = get("http://example.com/b", true);
    p.enqueue(b);
    assert_eq!(run(&mut p).unwrap(), DriveStatus::WouldBlock);
    p.transport_mut()
        .push_data(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb");
    assert_eq!(run(&mut p).unwrap(), DriveStatus::Done);

    assert_eq!(&sink_b.body()[..], b"b");
    // Same target, first on the connection, reused.
    assert_eq!(p.transport().resets(), 0);
    assert!(p.transport().connects().iter().all(|(t, _)| t.host == "example.com"));
}
