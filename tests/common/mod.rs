use setube::app::Config;
use setube::conversion::{ConversionSession, SessionState};
use setube::Orchestrator;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const SECOND_VIDEO_URL: &str = "https://youtu.be/9bZkp7q19f0";
pub const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLtest";

/// Config pointing at `server` with delays short enough for real-time tests
pub fn test_config(server: &MockServer, output_dir: &Path) -> Config {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.timeout_secs = 10;
    config.resolver.pending_delay_ms = 10;
    config.resolver.settle_delay_ms = 50;
    config.resolver.playlist_settle_delay_ms = 50;
    config.stream.grace_period_ms = 5000;
    config.stream.close_delay_ms = 100;
    // Long enough that a finished body is not replayed during a test
    config.stream.reconnect_delay_ms = 10_000;
    config.output.directory = output_dir.to_path_buf();
    config
}

/// Answer `/metadata/video` for `url` with `title`
pub async fn mount_video_metadata(server: &MockServer, url: &str, title: &str) {
    Mock::given(method("POST"))
        .and(path("/metadata/video"))
        .and(body_json(serde_json::json!({ "urls": [url] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "urls": [{
                "title": title,
                "description": "",
                "thumbnail": {"url": "https://i.ytimg.com/vi/x/hqdefault.jpg", "width": 480, "height": 360},
                "availableQualities": ["360p", "720p"]
            }]
        })))
        .mount(server)
        .await;
}

/// Answer `/metadata/playlist` in the nested layout with the given item URLs
#[allow(dead_code)]
pub async fn mount_playlist(server: &MockServer, title: &str, items: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/metadata/playlist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": {
                "id": "PLtest",
                "thumbnail": {"url": "https://i.ytimg.com/pl.jpg", "width": 480, "height": 360},
                "url": PLAYLIST_URL,
                "title": title,
                "description": "",
                "total_items": items.len(),
                "views": 42
            },
            "total": items.len(),
            "urls": items
        })))
        .mount(server)
        .await;
}

/// Answer `/convert` with `body`, optionally naming it through Content-Disposition
pub fn convert_response(body: &[u8], disposition: Option<&str>) -> ResponseTemplate {
    let template = ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/octet-stream");
    match disposition {
        Some(value) => template.append_header("Content-Disposition", value),
        None => template,
    }
}

#[allow(dead_code)]
pub async fn mount_convert(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/convert"))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Serve one `success` frame per filename on `/events`, then end the body
#[allow(dead_code)]
pub async fn mount_events(server: &MockServer, filenames: &[&str]) {
    let mut body = String::from(": connected\n\n");
    for name in filenames {
        let frame = serde_json::json!({ "type": "success", "filename": name });
        body.push_str(&format!("data: {}\n\n", frame));
    }

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

/// Poll the active session until it reaches `state` or the timeout elapses
#[allow(dead_code)]
pub async fn wait_for_session_state(
    orchestrator: &Orchestrator,
    state: SessionState,
    timeout: Duration,
) -> Option<ConversionSession> {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if let Some(session) = orchestrator.session().filter(|s| s.state == state) {
            return Some(session);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

/// Type `url` into the first entry and wait for its lookup to settle
#[allow(dead_code)]
pub async fn enter_first_url(orchestrator: &Orchestrator, url: &str) -> uuid::Uuid {
    let id = orchestrator.entries().await[0].id();
    orchestrator.update_url(id, url).await;
    orchestrator.resolver().wait_idle().await;
    id
}

/// Serve `/convert` by hand: headers and `head` at once, `tail` after `pause`
///
/// Returns the base URL. Lets a test act while the body is still arriving.
#[allow(dead_code)]
pub async fn serve_slow_body(
    filename: &'static str,
    head: &'static [u8],
    tail: &'static [u8],
    pause: Duration,
) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let headers = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\n\
                     Content-Disposition: attachment; filename=\"{}\"\r\n\
                     Content-Length: {}\r\n\r\n",
                    filename,
                    head.len() + tail.len()
                );
                let _ = socket.write_all(headers.as_bytes()).await;
                let _ = socket.write_all(head).await;
                let _ = socket.flush().await;
                tokio::time::sleep(pause).await;
                let _ = socket.write_all(tail).await;
                let _ = socket.flush().await;
            });
        }
    });

    format!("http://{}", addr)
}

#[allow(dead_code)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
