//! The `axum` HTTP surface (§6.1): translates URL path + query string into
//! a coordinator call, bridging into the core's blocking decode/scale work
//! via `spawn_blocking` so the async runtime's worker threads never stall
//! on it.

use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use ffmpeg::format::Pixel;
use harvid_core::{Error as CoreError, FrameRequest};
use harvid_util::cancel::CancelToken;
use serde::Deserialize;
use tokio::task::spawn_blocking;

use crate::{
    dirindex::{self, IndexFormat},
    encode::{self, RenderFormat},
    error::AppResult,
    path_guard,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct FrameQuery {
    #[serde(default)]
    pub frame: u64,
    #[serde(default = "default_dim")]
    pub w: i32,
    #[serde(default = "default_dim")]
    pub h: i32,
    #[serde(default)]
    pub format: Option<String>,
}

fn default_dim() -> i32 {
    -1
}

/// `GET /` — the docroot itself, which is always a directory.
pub async fn serve_root(
    State(state): State<AppState>,
    Query(query): Query<FrameQuery>,
) -> AppResult<Response> {
    render_path(state, String::new(), query).await
}

/// `GET /<path-to-media>?frame=&w=&h=&format=` and, for a directory target,
/// `GET /<path-to-dir>/?format={html,xhtml,json,csv,plain}`.
pub async fn serve_path(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
    Query(query): Query<FrameQuery>,
) -> AppResult<Response> {
    render_path(state, raw_path, query).await
}

async fn render_path(state: AppState, raw_path: String, query: FrameQuery) -> AppResult<Response> {
    let docroot = state.docroot.clone();
    let resolved = path_guard::resolve(&docroot, &raw_path, state.admin)?;

    if resolved.is_dir() {
        return serve_dir_index(state, resolved, &raw_path, &query).await;
    }

    let format_str = query.format.as_deref().unwrap_or("png");
    let render_format = RenderFormat::parse(format_str)
        .ok_or_else(|| CoreError::BadRequest(format!("unknown format {format_str}")))?;
    let pixel_format = decode_pixel_format(format_str);

    let req = FrameRequest {
        path: resolved.to_string_lossy().into_owned(),
        frame: query.frame,
        out_width: query.w,
        out_height: query.h,
        pixel_format,
    };

    let coordinator = state.coordinator.clone();
    let cancel = CancelToken::new();
    let rendered = spawn_blocking(move || coordinator.render_frame(&req, &cancel))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))??;

    let body = encode::encode(
        render_format,
        &rendered.data,
        rendered.width,
        rendered.height,
        rendered.pixel_format,
    )?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, render_format.content_type())],
        body,
    )
        .into_response())
}

async fn serve_dir_index(
    state: AppState,
    resolved: PathBuf,
    raw_path: &str,
    query: &FrameQuery,
) -> AppResult<Response> {
    if state.no_index {
        return Err(CoreError::Forbidden("directory index disabled".to_string()).into());
    }

    let format_str = query.format.as_deref().unwrap_or("html");
    let format = IndexFormat::parse(format_str)
        .ok_or_else(|| CoreError::BadRequest(format!("unknown index format {format_str}")))?;

    let entries = spawn_blocking(move || dirindex::list_entries(&resolved))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?
        .map_err(|e| CoreError::Internal(e.to_string()))?;

    let body = dirindex::render(&entries, raw_path, format);
    Ok(([(axum::http::header::CONTENT_TYPE, format.content_type())], body).into_response())
}

/// `rgb`/`rgba` formats also select the decoder's output pixel format
/// (§6: "formats rgb/rgba also select the decoded pixel format").
fn decode_pixel_format(format_str: &str) -> Pixel {
    match format_str {
        "rgba" => Pixel::RGBA,
        _ => Pixel::RGB24,
    }
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
}

/// `GET /info?file=<path>`.
pub async fn file_info(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> AppResult<Json<harvid_core::VideoInfo>> {
    let file = query
        .file
        .ok_or_else(|| CoreError::BadRequest("missing file parameter".to_string()))?;
    let resolved = path_guard::resolve(&state.docroot, &file, state.admin)?;

    let coordinator = state.coordinator.clone();
    let path = resolved.to_string_lossy().into_owned();
    let info = spawn_blocking(move || coordinator.file_info(&path))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))??;
    Ok(Json(info))
}

/// `GET /pool`.
pub async fn pool_info(
    State(state): State<AppState>,
) -> AppResult<Json<harvid_core::Diagnostics>> {
    let coordinator = state.coordinator.clone();
    let diagnostics = spawn_blocking(move || coordinator.pool_info())
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(Json(diagnostics))
}

/// `POST /purge` or `POST /purge?file=<path>`.
pub async fn purge(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> AppResult<()> {
    if !state.admin {
        return Err(CoreError::Forbidden("purge requires --admin".to_string()).into());
    }
    let resolved_file = match query.file {
        Some(f) => Some(
            path_guard::resolve(&state.docroot, &f, state.admin)?
                .to_string_lossy()
                .into_owned(),
        ),
        None => None,
    };
    let coordinator = state.coordinator.clone();
    spawn_blocking(move || coordinator.purge_cache(resolved_file.as_deref()))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(())
}
