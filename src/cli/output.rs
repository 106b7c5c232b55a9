use crate::api::{PlaylistMetadata, VideoMetadata};
use crate::conversion::{ConversionSession, SessionState};
use crate::registry::{Resolution, UrlEntry, Validity};

/// Format bytes into human-readable string (KB, MB, GB)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn entry_marker(entry: &UrlEntry) -> &'static str {
    match (entry.validity(), entry.resolution()) {
        (_, Resolution::Resolved) => "✓",
        (_, Resolution::Pending) => "…",
        (_, Resolution::Failed) | (Validity::InvalidFormat, _) => "✗",
        _ => " ",
    }
}

pub fn format_entry(entry: &UrlEntry) -> String {
    let url = if entry.url().is_empty() {
        "(empty)"
    } else {
        entry.url()
    };
    let mut line = format!("{} {} {}", entry_marker(entry), entry.id(), url);
    if let Some(metadata) = entry.metadata() {
        line.push_str(&format!("  \"{}\"", metadata.title));
    }
    line
}

pub fn format_entries(entries: &[UrlEntry], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(entries).unwrap_or_else(|_| "[]".to_string());
    }

    let ready = entries.iter().filter(|e| e.is_resolved()).count();
    let mut output: Vec<String> = entries.iter().map(format_entry).collect();
    output.push(format!("{} link(s), {} ready", entries.len(), ready));
    output.join("\n")
}

pub fn format_video(metadata: &VideoMetadata) -> String {
    let mut output = format!("Title: {}\n", metadata.title);
    if !metadata.description.is_empty() {
        output.push_str(&format!("Description: {}\n", metadata.description));
    }
    if !metadata.thumbnail.url.is_empty() {
        output.push_str(&format!(
            "Thumbnail: {} ({}x{})\n",
            metadata.thumbnail.url, metadata.thumbnail.width, metadata.thumbnail.height
        ));
    }
    if !metadata.available_qualities.is_empty() {
        output.push_str(&format!(
            "Qualities: {}\n",
            metadata.available_qualities.join(", ")
        ));
    }
    output.trim_end().to_string()
}

pub fn format_playlist(metadata: &PlaylistMetadata) -> String {
    let mut output = format!("Playlist: {}\n", metadata.title);
    if !metadata.id.is_empty() {
        output.push_str(&format!("ID: {}\n", metadata.id));
    }
    output.push_str(&format!("Items: {}\n", metadata.expected_items()));
    if metadata.view_count > 0 {
        output.push_str(&format!("Views: {}\n", metadata.view_count));
    }
    output.trim_end().to_string()
}

/// One-line progress summary, suitable for redrawing with `\r`
pub fn format_progress(session: &ConversionSession) -> String {
    let last = session
        .completed_items
        .last()
        .map(|item| format!(" {}", item.filename))
        .unwrap_or_default();
    format!(
        "[{:3.0}%] {}/{} done, {} remaining{}",
        session.progress_percent(),
        session.completed_items.len(),
        session.total_expected,
        session.remaining(),
        last
    )
}

pub fn format_session(session: &ConversionSession) -> String {
    match session.state {
        SessionState::Completed => match &session.saved_file {
            Some(saved) => format!(
                "Saved {} ({})",
                saved.path.display(),
                format_bytes(saved.bytes)
            ),
            None => "Conversion completed".to_string(),
        },
        SessionState::Failed => format!(
            "Conversion failed: {}",
            session.error.as_deref().unwrap_or("unknown error")
        ),
        SessionState::Cancelled => "Conversion cancelled".to_string(),
        SessionState::Running | SessionState::Idle => format_progress(session),
    }
}
