use lineflux::{AsyncWriter, WriterConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Minimal InfluxDB stand-in: answers every request with `status_line` and
/// records request targets and bodies.
async fn spawn_fake_influx(status_line: &'static str) -> (String, Arc<Mutex<Vec<(String, String)>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let recorded = Arc::clone(&recorded);
            tokio::spawn(serve_request(socket, status_line, recorded));
        }
    });

    (format!("http://{}", addr), requests)
}

async fn serve_request(
    mut socket: TcpStream,
    status_line: &'static str,
    recorded: Arc<Mutex<Vec<(String, String)>>>,
) -> Option<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];

    let (target, body) = loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        request.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&request).to_string();
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|l| {
                l.to_ascii_lowercase()
                    .strip_prefix("content-length:")
                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
            })
            .unwrap_or(0);
        if request.len() < header_end + 4 + content_length {
            continue;
        }

        let target = text
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .unwrap_or_default()
            .to_string();
        break (target, text[header_end + 4..].to_string());
    };

    // Recorded before answering so the client never sees a response first
    recorded.lock().unwrap().push((target, body));

    let response = format!("{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status_line);
    socket.write_all(response.as_bytes()).await.ok()?;
    socket.shutdown().await.ok();
    Some(())
}

fn config_for(url: &str) -> WriterConfig {
    let mut config = WriterConfig::new(url, "telemetry")
        .with_batch(3, Some(Duration::from_millis(20)))
        .with_max_in_flight(1);
    config.http.keepalive = false;
    config.http.timeout = Duration::from_secs(5);
    config
}

#[tokio::test]
async fn test_writer_posts_batches_over_http() {
    let (url, requests) = spawn_fake_influx("HTTP/1.1 204 No Content").await;
    let writer = AsyncWriter::connect(config_for(&url)).unwrap();
    let mut outcomes = writer.subscribe();

    for i in 0..5 {
        writer.submit(format!("cpu,host=a usage={}i\n", i));
    }
    let report = writer.shutdown().await;
    assert_eq!(report.dispatcher.succeeded, 2);

    let mut statuses = Vec::new();
    while let Some(outcome) = outcomes.recv().await {
        statuses.push(outcome.status_code);
    }
    assert_eq!(statuses, vec![Some(204), Some(204)]);

    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|(target, _)| target == "/write?db=telemetry"));
    let bodies: Vec<_> = requests.iter().map(|(_, body)| body.as_str()).collect();
    assert!(bodies.contains(&"cpu,host=a usage=0i\ncpu,host=a usage=1i\ncpu,host=a usage=2i"));
    assert!(bodies.contains(&"cpu,host=a usage=3i\ncpu,host=a usage=4i"));
}

#[tokio::test]
async fn test_rejected_write_is_reported_not_retried() {
    let (url, requests) = spawn_fake_influx("HTTP/1.1 400 Bad Request").await;
    let writer = AsyncWriter::connect(config_for(&url)).unwrap();
    let mut outcomes = writer.subscribe();

    writer.submit("cpu,host=a usage=");
    let report = writer.shutdown().await;
    assert_eq!(report.dispatcher.failed, 1);

    let outcome = outcomes.recv().await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.status_code, Some(400));
    assert!(outcomes.recv().await.is_none());
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_connect_rejects_bad_database_name() {
    let result = AsyncWriter::connect(WriterConfig::new("http://localhost:8086", "db;drop"));
    assert!(result.is_err());
}
