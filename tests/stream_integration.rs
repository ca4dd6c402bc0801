//! Integration tests for streaming queries over HTTP.
//!
//! These tests run `QueryClient` against a minimal HTTP/1.1 server on a
//! loopback socket. Each server answers exactly one request with a scripted
//! chunked response, so tests control chunk boundaries, delays and
//! disconnects.
//!
//! # Running
//!
//! ```bash
//! cargo test --test stream_integration -- --nocapture
//! ```

use std::sync::mpsc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use banquet_tui::client::{ClientError, QueryClient};
use banquet_tui::config::Config;
use banquet_tui::models::{Cell, ColumnInfo, Row};
use banquet_tui::stream::{QueryUpdate, StreamEvent, StreamOutcome, StreamSink};

/// Upper bound on any single test interaction.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const HEADER: &str =
    r#"{"columns":[{"name":"id","type":"INTEGER"},{"name":"name","type":"TEXT"}],"total":3}"#;

/// Request as seen by the test server.
#[derive(Debug)]
struct Request {
    method: String,
    target: String,
    body: Vec<u8>,
}

/// One step of a scripted response body.
enum Step {
    /// Write one HTTP chunk.
    Send(Vec<u8>),
    /// Pause before the next step.
    Sleep(Duration),
}

/// Scripted response.
struct Reply {
    status: &'static str,
    steps: Vec<Step>,
    /// Send the terminating zero-length chunk. When false the connection
    /// is closed mid-body.
    complete: bool,
}

impl Reply {
    fn ok(steps: Vec<Step>) -> Self {
        Self {
            status: "200 OK",
            steps,
            complete: true,
        }
    }
}

fn send(text: &str) -> Step {
    Step::Send(text.as_bytes().to_vec())
}

fn lines(records: &[&str]) -> Step {
    let mut body = String::new();
    for record in records {
        body.push_str(record);
        body.push('\n');
    }
    Step::Send(body.into_bytes())
}

/// Start a server that answers one request and returns what it received.
async fn spawn_server<F>(respond: F) -> (Url, JoinHandle<Request>)
where
    F: FnOnce(&Request) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let reply = respond(&request);
        // The client may hang up early (cancellation tests).
        let _ = write_reply(&mut socket, reply).await;
        request
    });

    (Url::parse(&format!("http://{}", addr)).unwrap(), task)
}

async fn read_request(socket: &mut TcpStream) -> Request {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];

    let header_end = loop {
        let n = socket.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut head_lines = head.lines();
    let mut request_line = head_lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();

    let content_length = head_lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed before sending body");
        body.extend_from_slice(&tmp[..n]);
    }

    Request {
        method,
        target,
        body,
    }
}

async fn write_reply(socket: &mut TcpStream, reply: Reply) -> std::io::Result<()> {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        reply.status
    );
    socket.write_all(head.as_bytes()).await?;
    socket.flush().await?;

    for step in reply.steps {
        match step {
            Step::Send(data) => {
                socket
                    .write_all(format!("{:x}\r\n", data.len()).as_bytes())
                    .await?;
                socket.write_all(&data).await?;
                socket.write_all(b"\r\n").await?;
                socket.flush().await?;
            }
            Step::Sleep(duration) => tokio::time::sleep(duration).await,
        }
    }

    if reply.complete {
        socket.write_all(b"0\r\n\r\n").await?;
    }
    socket.shutdown().await
}

fn client_for(url: Url) -> QueryClient {
    let config = Config {
        server_url: url,
        ..Config::default()
    };
    QueryClient::new(&config).unwrap()
}

fn header_event() -> StreamEvent {
    StreamEvent::Header {
        columns: vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("name", "TEXT"),
        ],
        total: 3,
    }
}

fn row(id: i64, name: &str) -> Row {
    vec![Cell::Integer(id), Cell::Text(name.to_string())]
}

/// Run one query into a `Vec` sink.
async fn run_query(
    client: &QueryClient,
    banquet_url: &str,
) -> (Vec<StreamEvent>, Option<StreamOutcome>) {
    let cancel = CancellationToken::new();
    let consumer = tokio::time::timeout(
        TEST_TIMEOUT,
        client.stream_query(banquet_url, Vec::new(), &cancel),
    )
    .await
    .expect("query timed out");
    let outcome = consumer.outcome();
    (consumer.into_sink(), outcome)
}

/// Test: header, row batches and completion arrive in order.
#[tokio::test]
async fn test_streams_header_rows_and_completion() {
    let (url, server) = spawn_server(|_| {
        Reply::ok(vec![
            lines(&[HEADER]),
            Step::Sleep(Duration::from_millis(20)),
            lines(&[r#"{"rows":[[1,"a"],[2,"b"]]}"#]),
            Step::Sleep(Duration::from_millis(20)),
            lines(&[r#"{"rows":[[3,"c"]]}"#]),
        ])
    })
    .await;

    let client = client_for(url);
    let (events, outcome) = run_query(&client, "Index.sqlite/tb0?limit=3").await;

    assert_eq!(
        events,
        vec![
            header_event(),
            StreamEvent::Rows(vec![row(1, "a"), row(2, "b")]),
            StreamEvent::Rows(vec![row(3, "c")]),
            StreamEvent::Complete { total_rows: 3 },
        ]
    );
    assert_eq!(outcome, Some(StreamOutcome::Completed { total_rows: 3 }));

    let request = server.await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/query");
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["banquet_url"], "Index.sqlite/tb0?limit=3");
}

/// Test: records split across HTTP chunks at arbitrary points decode intact.
#[tokio::test]
async fn test_records_split_across_chunks() {
    let body = format!("{}\r\n{}\n", HEADER, r#"{"rows":[[1,"a"],[2,"b"],[3,"c"]]}"#);
    let (first, rest) = body.split_at(17);
    let (second, third) = rest.split_at(rest.len() - 9);
    let (first, second, third) = (first.to_string(), second.to_string(), third.to_string());

    let (url, _server) = spawn_server(move |_| {
        Reply::ok(vec![
            send(&first),
            Step::Sleep(Duration::from_millis(10)),
            send(&second),
            Step::Sleep(Duration::from_millis(10)),
            send(&third),
        ])
    })
    .await;

    let (events, outcome) = run_query(&client_for(url), "Index.sqlite/tb0").await;

    assert_eq!(
        events,
        vec![
            header_event(),
            StreamEvent::Rows(vec![row(1, "a"), row(2, "b"), row(3, "c")]),
            StreamEvent::Complete { total_rows: 3 },
        ]
    );
    assert_eq!(outcome, Some(StreamOutcome::Completed { total_rows: 3 }));
}

/// Test: a connection dropped mid-body yields one error and no completion.
#[tokio::test]
async fn test_mid_body_disconnect_fails_stream() {
    let (url, _server) = spawn_server(|_| Reply {
        status: "200 OK",
        steps: vec![lines(&[HEADER, r#"{"rows":[[1,"a"]]}"#]), send(r#"{"rows":[[2,"#)],
        complete: false,
    })
    .await;

    let (events, outcome) = run_query(&client_for(url), "Index.sqlite/tb0").await;

    assert_eq!(outcome, Some(StreamOutcome::Failed));
    assert_eq!(events.len(), 3, "unexpected events: {:?}", events);
    assert_eq!(events[0], header_event());
    assert_eq!(events[1], StreamEvent::Rows(vec![row(1, "a")]));
    assert!(matches!(events[2], StreamEvent::Error(_)));
}

/// Test: a partial record at a clean end of body is reported, then completion.
#[tokio::test]
async fn test_truncated_tail_reports_error_then_completes() {
    let (url, _server) = spawn_server(|_| {
        Reply::ok(vec![
            lines(&[HEADER, r#"{"rows":[[1,"a"]]}"#]),
            send(r#"{"rows":[[2,"b"#),
        ])
    })
    .await;

    let (events, outcome) = run_query(&client_for(url), "Index.sqlite/tb0").await;

    assert_eq!(
        events,
        vec![
            header_event(),
            StreamEvent::Rows(vec![row(1, "a")]),
            StreamEvent::Error("Truncated record at end of stream (14 bytes discarded)".into()),
            StreamEvent::Complete { total_rows: 1 },
        ]
    );
    assert_eq!(outcome, Some(StreamOutcome::Completed { total_rows: 1 }));
}

/// Sink that cancels its query as soon as the first rows arrive.
struct CancelOnRows {
    events: Vec<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamSink for CancelOnRows {
    fn on_header(&mut self, columns: Vec<ColumnInfo>, total: u64) {
        self.events.on_header(columns, total);
    }

    fn on_rows(&mut self, rows: Vec<Row>) {
        self.events.on_rows(rows);
        self.cancel.cancel();
    }

    fn on_error(&mut self, message: String) {
        self.events.on_error(message);
    }

    fn on_complete(&mut self, total_rows: u64) {
        self.events.on_complete(total_rows);
    }
}

/// Test: cancelling after the first batch suppresses everything after it.
#[tokio::test]
async fn test_cancel_after_first_batch() {
    let (url, _server) = spawn_server(|_| {
        Reply::ok(vec![
            lines(&[HEADER, r#"{"rows":[[1,"a"]]}"#]),
            Step::Sleep(Duration::from_millis(500)),
            lines(&[r#"{"rows":[[2,"b"]]}"#, r#"{"error":"late"}"#]),
        ])
    })
    .await;

    let client = client_for(url);
    let cancel = CancellationToken::new();
    let sink = CancelOnRows {
        events: Vec::new(),
        cancel: cancel.clone(),
    };

    let consumer = tokio::time::timeout(
        TEST_TIMEOUT,
        client.stream_query("Index.sqlite/tb0", sink, &cancel),
    )
    .await
    .expect("query timed out");

    assert_eq!(consumer.outcome(), Some(StreamOutcome::Cancelled));
    assert_eq!(
        consumer.into_sink().events,
        vec![header_event(), StreamEvent::Rows(vec![row(1, "a")])]
    );
}

/// Test: a refused connection is one stream-level error.
#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("http://{}", addr)).unwrap();
    let (events, outcome) = run_query(&client_for(url), "Index.sqlite/tb0").await;

    assert_eq!(outcome, Some(StreamOutcome::Failed));
    assert_eq!(events.len(), 1, "unexpected events: {:?}", events);
    assert!(matches!(events[0], StreamEvent::Error(_)));
}

/// Test: an error status streams the server's error record, then completes.
#[tokio::test]
async fn test_error_status_reports_body_then_completes() {
    let (url, _server) = spawn_server(|_| Reply {
        status: "400 Bad Request",
        steps: vec![lines(&[r#"{"error":"Failed to parse Banquet URL: table name required"}"#])],
        complete: true,
    })
    .await;

    let (events, outcome) = run_query(&client_for(url), "Index.sqlite").await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Error("Failed to parse Banquet URL: table name required".into()),
            StreamEvent::Complete { total_rows: 0 },
        ]
    );
    assert_eq!(outcome, Some(StreamOutcome::Completed { total_rows: 0 }));
}

/// Test: an error status with no error record reports the status itself.
#[tokio::test]
async fn test_error_status_without_body_reports_status() {
    let (url, _server) = spawn_server(|_| Reply {
        status: "500 Internal Server Error",
        steps: vec![],
        complete: true,
    })
    .await;

    let (events, outcome) = run_query(&client_for(url), "Index.sqlite/tb0").await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Error("Server returned HTTP 500 Internal Server Error".into()),
            StreamEvent::Complete { total_rows: 0 },
        ]
    );
    assert_eq!(outcome, Some(StreamOutcome::Completed { total_rows: 0 }));
}

/// Test: a line over the configured limit aborts the stream.
#[tokio::test]
async fn test_oversized_line_aborts_stream() {
    let long_name = "x".repeat(200);
    let long_row = format!(r#"{{"rows":[[1,"{}"]]}}"#, long_name);

    let (url, _server) = spawn_server(move |_| {
        Reply::ok(vec![
            lines(&[r#"{"rows":[[0,"ok"]]}"#]),
            lines(&[long_row.as_str()]),
            lines(&[r#"{"rows":[[2,"never"]]}"#]),
        ])
    })
    .await;

    let config = Config {
        server_url: url,
        max_line_len: 64,
        ..Config::default()
    };
    let client = QueryClient::new(&config).unwrap();
    let (events, outcome) = run_query(&client, "Index.sqlite/tb0").await;

    assert_eq!(outcome, Some(StreamOutcome::Failed));
    assert_eq!(events.len(), 2, "unexpected events: {:?}", events);
    assert_eq!(events[0], StreamEvent::Rows(vec![row(0, "ok")]));
    match &events[1] {
        StreamEvent::Error(message) => assert!(message.contains("exceeds maximum 64 bytes")),
        other => panic!("expected error, got {:?}", other),
    }
}

/// Test: spawned queries forward tagged events over the channel.
#[tokio::test]
async fn test_spawn_query_forwards_tagged_updates() {
    let (url, _server) = spawn_server(|_| {
        Reply::ok(vec![lines(&[HEADER, r#"{"rows":[[1,"a"],[2,"b"],[3,"c"]]}"#])])
    })
    .await;

    let client = client_for(url);
    let (tx, rx) = mpsc::channel::<QueryUpdate>();
    let handle = client.spawn_query(
        &tokio::runtime::Handle::current(),
        7,
        "Index.sqlite/tb0".to_string(),
        tx,
    );

    let outcome = tokio::time::timeout(TEST_TIMEOUT, handle.join())
        .await
        .expect("query timed out");
    assert_eq!(outcome, Some(StreamOutcome::Completed { total_rows: 3 }));

    let updates: Vec<QueryUpdate> = rx.try_iter().collect();
    assert!(updates.iter().all(|u| u.query_id == 7));
    let events: Vec<StreamEvent> = updates.into_iter().map(|u| u.event).collect();
    assert_eq!(
        events,
        vec![
            header_event(),
            StreamEvent::Rows(vec![row(1, "a"), row(2, "b"), row(3, "c")]),
            StreamEvent::Complete { total_rows: 3 },
        ]
    );
}

/// Test: health check hits `/health`.
#[tokio::test]
async fn test_health() {
    let (url, server) = spawn_server(|_| Reply::ok(vec![send("OK")])).await;

    tokio::time::timeout(TEST_TIMEOUT, client_for(url).health())
        .await
        .expect("health timed out")
        .unwrap();

    let request = server.await.unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/health");
}

/// Test: schema lookup encodes the table and dataset.
#[tokio::test]
async fn test_fetch_schema() {
    let (url, server) = spawn_server(|_| {
        Reply::ok(vec![send(
            r#"{"columns":[{"name":"id","type":"INTEGER"},{"name":"name","type":"TEXT"}]}"#,
        )])
    })
    .await;

    let columns = tokio::time::timeout(
        TEST_TIMEOUT,
        client_for(url).fetch_schema("data/Index.sqlite", "tb0"),
    )
    .await
    .expect("schema timed out")
    .unwrap();

    assert_eq!(
        columns,
        vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("name", "TEXT"),
        ]
    );
    let request = server.await.unwrap();
    assert_eq!(request.target, "/schema/tb0?db=data%2FIndex.sqlite");
}

/// Test: schema errors surface the server's message.
#[tokio::test]
async fn test_fetch_schema_error() {
    let (url, _server) = spawn_server(|_| Reply {
        status: "404 Not Found",
        steps: vec![send(r#"{"error":"no such table: nope"}"#)],
        complete: true,
    })
    .await;

    let result = tokio::time::timeout(
        TEST_TIMEOUT,
        client_for(url).fetch_schema("Index.sqlite", "nope"),
    )
    .await
    .expect("schema timed out");

    match result {
        Err(ClientError::Server(message)) => assert_eq!(message, "no such table: nope"),
        other => panic!("expected server error, got {:?}", other),
    }
}
