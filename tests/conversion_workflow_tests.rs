//! End-to-end conversion workflows against a mock conversion service

mod common;

use common::*;
use pretty_assertions::assert_eq;
use setube::api::ApiClient;
use setube::conversion::{
    ConversionDispatcher, ConversionError, ConversionMode, DispatcherSettings, OutputFormat,
    SessionState, SubmitRequest, STREAM_LOST_MESSAGE,
};
use setube::notify::{ErrorChannel, ErrorKind};
use setube::registry::Resolution;
use setube::Orchestrator;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_individual_conversion_saves_named_file() {
    init_logging();
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_video_metadata(&server, VIDEO_URL, "Never Gonna Give You Up").await;
    mount_convert(
        &server,
        convert_response(b"ID3 audio", Some("attachment; filename*=UTF-8''Song%20A.mp3")),
    )
    .await;

    let orchestrator = Orchestrator::new(&test_config(&server, output.path()), None).unwrap();
    let id = enter_first_url(&orchestrator, VIDEO_URL).await;

    let entry = orchestrator.entries().await.into_iter().find(|e| e.id() == id).unwrap();
    assert_eq!(entry.resolution(), Resolution::Resolved);
    assert_eq!(entry.metadata().unwrap().title, "Never Gonna Give You Up");
    assert!(orchestrator.can_convert().await);

    let session = orchestrator.submit().await.unwrap();

    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.mode, ConversionMode::Individual);
    let saved = session.saved_file.unwrap();
    assert_eq!(saved.path, output.path().join("Song A.mp3"));
    assert_eq!(saved.bytes, 9);
    assert_eq!(std::fs::read(&saved.path).unwrap(), b"ID3 audio");
    assert!(orchestrator.errors().current().is_none());
}

#[tokio::test]
async fn test_multiple_links_without_disposition_default_to_zip() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_video_metadata(&server, VIDEO_URL, "First").await;
    mount_video_metadata(&server, SECOND_VIDEO_URL, "Second").await;
    mount_convert(&server, convert_response(b"PK\x03\x04", None)).await;

    let orchestrator = Orchestrator::new(&test_config(&server, output.path()), None).unwrap();
    enter_first_url(&orchestrator, VIDEO_URL).await;
    let second = orchestrator.add_entry().await;
    orchestrator.update_url(second, SECOND_VIDEO_URL).await;
    orchestrator.resolver().wait_idle().await;
    orchestrator.set_format(OutputFormat::M4a).await;

    let session = orchestrator.submit().await.unwrap();

    assert_eq!(session.total_expected, 2);
    assert_eq!(
        session.saved_file.unwrap().path,
        output.path().join("download.zip")
    );
}

#[tokio::test]
async fn test_rejected_conversion_fails_session_and_raises_error() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_video_metadata(&server, VIDEO_URL, "Song").await;
    mount_convert(
        &server,
        ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "ffmpeg exited with code 1"})),
    )
    .await;

    let orchestrator = Orchestrator::new(&test_config(&server, output.path()), None).unwrap();
    let mut errors = orchestrator.subscribe_errors();
    enter_first_url(&orchestrator, VIDEO_URL).await;

    let err = orchestrator.submit().await.unwrap_err();
    assert!(matches!(err, ConversionError::Api(_)));

    let session = orchestrator.session().unwrap();
    assert_eq!(session.state, SessionState::Failed);
    assert!(session.error.unwrap().contains("ffmpeg exited with code 1"));

    let raised = errors.recv().await.unwrap();
    assert_eq!(raised.kind, ErrorKind::DispatchRejected);
    assert!(raised.message.contains("ffmpeg exited with code 1"));

    assert_eq!(std::fs::read_dir(output.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn test_nothing_to_convert_without_resolved_links() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    let orchestrator = Orchestrator::new(&test_config(&server, output.path()), None).unwrap();
    assert!(!orchestrator.can_convert().await);

    let err = orchestrator.submit().await.unwrap_err();
    assert!(matches!(err, ConversionError::NothingToConvert(_)));
    assert!(orchestrator.session().is_none());
}

#[tokio::test]
async fn test_playlist_conversion_tracks_items() {
    init_logging();
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_playlist(&server, "Road Trip", &[VIDEO_URL, SECOND_VIDEO_URL]).await;
    mount_events(&server, &["first.mp3", "second.mp3"]).await;
    mount_convert(
        &server,
        convert_response(b"PK\x03\x04", Some("attachment; filename=\"Road Trip.zip\""))
            .set_delay(Duration::from_millis(500)),
    )
    .await;

    let orchestrator = Orchestrator::new(&test_config(&server, output.path()), None).unwrap();
    orchestrator.set_mode(ConversionMode::Playlist).await;
    orchestrator.set_playlist_source(PLAYLIST_URL).await;
    orchestrator.playlist_resolver().wait_idle().await;

    let playlist = orchestrator.playlist().await;
    assert!(!playlist.loading);
    assert_eq!(playlist.metadata.as_ref().unwrap().title, "Road Trip");
    assert!(orchestrator.can_convert().await);

    let session = orchestrator.submit().await.unwrap();

    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.total_expected, 2);
    let names: Vec<&str> = session
        .completed_items
        .iter()
        .map(|item| item.filename.as_str())
        .collect();
    assert_eq!(names, vec!["first.mp3", "second.mp3"]);
    assert_eq!(session.remaining(), 0);
    assert_eq!(
        session.saved_file.unwrap().path,
        output.path().join("Road Trip.zip")
    );

    // The progress channel is released shortly after completion
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!orchestrator.dispatcher().has_open_stream());
}

#[tokio::test]
async fn test_playlist_conversion_fails_when_channel_is_lost() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_playlist(&server, "Broken", &[VIDEO_URL]).await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a stream"))
        .mount(&server)
        .await;
    mount_convert(
        &server,
        convert_response(b"PK", None).set_delay(Duration::from_millis(1500)),
    )
    .await;

    let mut config = test_config(&server, output.path());
    config.stream.grace_period_ms = 200;
    let orchestrator = Orchestrator::new(&config, None).unwrap();
    orchestrator.set_mode(ConversionMode::Playlist).await;
    orchestrator.set_playlist_source(PLAYLIST_URL).await;
    orchestrator.playlist_resolver().wait_idle().await;

    let err = orchestrator.submit().await.unwrap_err();
    assert!(matches!(err, ConversionError::StreamLost));

    let session = orchestrator.session().unwrap();
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(session.error.as_deref(), Some(STREAM_LOST_MESSAGE));
    assert_eq!(orchestrator.errors().current().unwrap().kind, ErrorKind::StreamLost);
    assert!(session.saved_file.is_none());
}

#[tokio::test]
async fn test_newer_submission_supersedes_running_one() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/convert"))
        .and(body_json(serde_json::json!({
            "urls": [VIDEO_URL],
            "format": "mp3",
            "kind": "audio"
        })))
        .respond_with(
            convert_response(b"slow", Some("attachment; filename=\"slow.mp3\""))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/convert"))
        .and(body_json(serde_json::json!({
            "urls": [SECOND_VIDEO_URL],
            "format": "mp3",
            "kind": "audio"
        })))
        .respond_with(convert_response(b"fast", Some("attachment; filename=\"fast.mp3\"")))
        .mount(&server)
        .await;

    let dispatcher = ConversionDispatcher::new(
        ApiClient::with_base_url(&server.uri()).unwrap(),
        ErrorChannel::new(Duration::from_secs(5)),
        DispatcherSettings {
            output_dir: output.path().to_path_buf(),
            ..DispatcherSettings::default()
        },
    );

    let first = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .submit(SubmitRequest::individual(vec![VIDEO_URL.to_string()], OutputFormat::Mp3))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = dispatcher
        .submit(SubmitRequest::individual(
            vec![SECOND_VIDEO_URL.to_string()],
            OutputFormat::Mp3,
        ))
        .await
        .unwrap();
    let first = first.await.unwrap();

    assert!(matches!(first, Err(ConversionError::Superseded)));
    assert_eq!(second.state, SessionState::Completed);
    assert_eq!(dispatcher.current().unwrap().id, second.id);
    assert!(output.path().join("fast.mp3").exists());
    assert!(!output.path().join("slow.mp3").exists());
}

#[tokio::test]
async fn test_cancel_discards_late_response() {
    let server = MockServer::start().await;
    let output = TempDir::new().unwrap();

    mount_video_metadata(&server, VIDEO_URL, "Song").await;
    mount_convert(
        &server,
        convert_response(b"late", Some("attachment; filename=\"late.mp3\""))
            .set_delay(Duration::from_millis(500)),
    )
    .await;

    let orchestrator = Orchestrator::new(&test_config(&server, output.path()), None).unwrap();
    enter_first_url(&orchestrator, VIDEO_URL).await;

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit().await })
    };
    let session = wait_for_session_state(&orchestrator, SessionState::Running, Duration::from_secs(2))
        .await
        .unwrap();
    assert!(!orchestrator.can_convert().await);

    assert!(orchestrator.cancel());
    let result = running.await.unwrap();

    assert!(matches!(result, Err(ConversionError::Superseded)));
    let current = orchestrator.session().unwrap();
    assert_eq!(current.id, session.id);
    assert_eq!(current.state, SessionState::Cancelled);
    assert!(!output.path().join("late.mp3").exists());

    orchestrator.dismiss_progress();
    assert!(orchestrator.session().is_none());
}

fn local_dispatcher(base_url: &str, output: &TempDir) -> ConversionDispatcher {
    ConversionDispatcher::new(
        ApiClient::with_base_url(base_url).unwrap(),
        ErrorChannel::new(Duration::from_secs(5)),
        DispatcherSettings {
            output_dir: output.path().to_path_buf(),
            ..DispatcherSettings::default()
        },
    )
}

async fn wait_for_file(path: &std::path::Path, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_cancel_while_body_streams_removes_partial_file() {
    init_logging();
    let output = TempDir::new().unwrap();
    let base_url =
        serve_slow_body("late.mp3", b"ID3aa", b" rest of the audio", Duration::from_millis(800))
            .await;
    let dispatcher = local_dispatcher(&base_url, &output);
    let target = output.path().join("late.mp3");

    let running = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .submit(SubmitRequest::individual(vec![VIDEO_URL.to_string()], OutputFormat::Mp3))
                .await
        })
    };

    // Headers are in and the file is open, the tail has not arrived yet
    assert!(wait_for_file(&target, Duration::from_secs(2)).await);
    assert!(dispatcher.cancel());
    let result = running.await.unwrap();

    assert!(matches!(result, Err(ConversionError::Superseded)));
    let current = dispatcher.current().unwrap();
    assert_eq!(current.state, SessionState::Cancelled);
    assert!(current.saved_file.is_none());
    assert!(!target.exists());
}

#[tokio::test]
async fn test_dismiss_while_body_streams_removes_partial_file() {
    let output = TempDir::new().unwrap();
    let base_url =
        serve_slow_body("slow.mp3", b"ID3aa", b" rest of the audio", Duration::from_millis(800))
            .await;
    let dispatcher = local_dispatcher(&base_url, &output);
    let target = output.path().join("slow.mp3");

    let running = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .submit(SubmitRequest::individual(vec![VIDEO_URL.to_string()], OutputFormat::Mp3))
                .await
        })
    };
    assert!(wait_for_file(&target, Duration::from_secs(2)).await);

    dispatcher.dismiss();
    let result = running.await.unwrap();

    assert!(matches!(result, Err(ConversionError::Superseded)));
    assert!(dispatcher.current().is_none());
    assert!(!target.exists());
}
