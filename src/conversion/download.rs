//! Saving the conversion artifact
//!
//! The response of a successful conversion request carries the artifact in its
//! body and the suggested name in `Content-Disposition`.

use super::error::{ConversionError, ConversionResult};
use super::format::OutputFormat;
use super::session::SavedFile;
use crate::file::naming::{ensure_unique_filename, sanitize_filename};
use futures_util::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::header::CONTENT_DISPOSITION;
use std::future::Future;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Pick the download name from a `Content-Disposition` value
///
/// RFC 5987 `filename*=` wins when it decodes as UTF-8, then the legacy
/// `filename=` parameter, then `download.zip` for batches or
/// `download.<format>` for a single link.
pub fn resolve_filename(
    content_disposition: Option<&str>,
    format: OutputFormat,
    url_count: usize,
) -> String {
    content_disposition
        .and_then(parse_content_disposition)
        .unwrap_or_else(|| default_filename(format, url_count))
}

pub fn default_filename(format: OutputFormat, url_count: usize) -> String {
    if url_count > 1 {
        "download.zip".to_string()
    } else {
        format!("download.{}", format.extension())
    }
}

fn parse_content_disposition(value: &str) -> Option<String> {
    let params: Vec<(String, &str)> = split_params(value)
        .into_iter()
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            Some((name.trim().to_ascii_lowercase(), value.trim()))
        })
        .collect();

    let extended = params
        .iter()
        .find(|(name, _)| name == "filename*")
        .and_then(|(_, value)| decode_extended(value));
    if extended.is_some() {
        return extended;
    }

    params
        .iter()
        .find(|(name, _)| name == "filename")
        .map(|(_, value)| unquote(value).trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Split header parameters on `;` outside quoted strings
fn split_params(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

/// Strip surrounding quotes and resolve `\x` escapes inside them
fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"') else {
        return value.to_string();
    };
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            _ => out.push(c),
        }
    }
    out
}

/// Decode `charset'language'percent-encoded` into a string
fn decode_extended(value: &str) -> Option<String> {
    let value = value.trim_matches('"');
    let encoded = match value.find("''") {
        Some(pos) => &value[pos + 2..],
        None => value.rsplit('\'').next().unwrap_or(value),
    };

    let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
    let decoded = decoded.trim();
    (!decoded.is_empty()).then(|| decoded.to_string())
}

/// Stream a successful conversion response into `output_dir`
///
/// If `cancelled` resolves before the body is complete, the partial file is
/// removed and [`ConversionError::Superseded`] is returned.
pub async fn save_response(
    response: reqwest::Response,
    output_dir: &Path,
    format: OutputFormat,
    url_count: usize,
    cancelled: impl Future<Output = ()>,
) -> ConversionResult<SavedFile> {
    let suggested = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = resolve_filename(suggested.as_deref(), format, url_count);

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| ConversionError::save(output_dir, e))?;

    let filename = ensure_unique_filename(output_dir, &sanitize_filename(&filename));
    let path = output_dir.join(filename);
    tracing::debug!("Saving conversion result to {:?}", path);

    let file = File::create(&path)
        .await
        .map_err(|e| ConversionError::save(&path, e))?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);

    match write_body(response, &mut writer, &path, cancelled).await {
        Ok(bytes) => {
            drop(writer);
            tracing::info!("Saved {} ({} bytes)", path.display(), bytes);
            Ok(SavedFile { path, bytes })
        }
        Err(e) => {
            drop(writer);
            remove_partial(&path).await;
            Err(e)
        }
    }
}

async fn write_body(
    response: reqwest::Response,
    writer: &mut BufWriter<File>,
    path: &Path,
    cancelled: impl Future<Output = ()>,
) -> ConversionResult<u64> {
    tokio::pin!(cancelled);
    let mut stream = response.bytes_stream();
    let mut bytes = 0u64;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = &mut cancelled => return Err(ConversionError::Superseded),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };

        let chunk = chunk.map_err(crate::api::ApiError::from)?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ConversionError::save(path, e))?;
        bytes += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| ConversionError::save(path, e))?;
    Ok(bytes)
}

/// Delete a file that must not be left behind
pub(crate) async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove {:?}: {}", path, e);
    }
}
