//! Panotour upload server.
//!
//! A small HTTP server in front of the tour directory:
//! - `POST {route}` takes a multipart upload (`pano` file plus `sceneName`,
//!   `ath`, `atv`, `linkedscene`), moves the image into the asset directory
//!   and appends a scene to `tour.xml`;
//! - `GET /healthz` answers `ok`;
//! - everything else is served as static files from the tour root (viewer
//!   pages, `tour.xml`, the asset directory).
//!
//! There is no authentication. Every response allows any origin.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use panotour_storage::{
    AddedScene, AssetStore, AuthoringError, SceneAppendService, SceneFields, StagedAsset,
    StorageError, TourLayout,
};
use panotour_tour::ScenePolicy;

type Body = UnsyncBoxBody<Bytes, std::io::Error>;

const UPLOAD_FIELD: &str = "pano";

const MSG_NO_IMAGE: &str = "no image selected";
const MSG_PROCESSING_FAILED: &str = "upload processing failed";
const MSG_MALFORMED: &str = "malformed upload";
const MSG_TOO_LARGE: &str = "upload too large";

/// What a successful upload answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResponseMode {
    /// `302` to a listing page.
    Redirect { location: String },
    /// `200` HTML fragment linking to the tour viewer.
    Link { viewer_url: String },
}

impl ResponseMode {
    pub(crate) fn parse(mode: &str, redirect_to: &str, viewer_url: &str) -> Result<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "redirect" => Ok(Self::Redirect {
                location: redirect_to.to_string(),
            }),
            "link" => Ok(Self::Link {
                viewer_url: viewer_url.to_string(),
            }),
            other => Err(anyhow!(
                "unknown --response `{}` (expected redirect|link)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct ServerConfig {
    listen: SocketAddr,
    route: String,
    response: ResponseMode,
    layout: TourLayout,
    policy: ScenePolicy,
    max_upload_bytes: u64,
    ready_file: Option<PathBuf>,
}

struct ServerState {
    config: ServerConfig,
    service: SceneAppendService,
    static_files: ServeDir,
}

pub(crate) fn cmd_serve(args: crate::ServeArgs) -> Result<()> {
    let route = args.route.trim().to_string();
    if !route.starts_with('/') {
        return Err(anyhow!("serve: --route must start with `/` (got `{route}`)"));
    }
    let response = ResponseMode::parse(&args.response, &args.redirect_to, &args.viewer_url)?;
    let listen = args
        .listen
        .unwrap_or_else(|| SocketAddr::new(args.host, args.port));

    let config = ServerConfig {
        listen,
        route,
        response,
        layout: args.layout.to_layout(),
        policy: args.policy.to_policy(),
        max_upload_bytes: args.max_upload_bytes,
        ready_file: args.ready_file.clone(),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { serve_async(config).await })
}

async fn serve_async(config: ServerConfig) -> Result<()> {
    config
        .layout
        .ensure_dirs()
        .await
        .map_err(|e| anyhow!("serve: {e}"))?;

    let tour_path = config.layout.tour_path();
    if !tour_path.exists() {
        tracing::warn!(
            tour = %tour_path.display(),
            "tour document does not exist; uploads will fail until it is created (see `panotour init`)"
        );
    }

    let state = Arc::new(ServerState {
        service: SceneAppendService::new(&config.layout, config.policy),
        static_files: ServeDir::new(&config.layout.root),
        config: config.clone(),
    });

    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", config.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    tracing::info!(
        addr = %bound,
        route = %config.route,
        root = %config.layout.root.display(),
        "listening on http://{bound}"
    );
    if let Some(path) = config.ready_file.as_ref() {
        let payload = serde_json::json!({
            "version": "panotour_server_ready_v1",
            "addr": bound.to_string(),
            "pid": std::process::id(),
        });
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, serde_json::to_string_pretty(&payload).unwrap_or_default()).ok();
    }

    loop {
        let (stream, _peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(error = %e, "connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut resp = if method == Method::OPTIONS {
        preflight_response(&req)
    } else if method == Method::POST && path == state.config.route {
        handle_upload(req, &state).await
    } else if method == Method::GET && path == "/healthz" {
        text_response(StatusCode::OK, "ok\n")
    } else {
        serve_static(req, &state).await
    };

    resp.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    Ok(resp)
}

fn full(body: impl Into<Bytes>) -> Body {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn text_response(status: StatusCode, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full(body.to_string()))
        .unwrap_or_else(|_| Response::new(full("internal error")))
}

fn html_response(status: StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(full(body))
        .unwrap_or_else(|_| Response::new(full("internal error")))
}

fn redirect_response(location: &str) -> Response<Body> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full(format!("Found. Redirecting to {location}")))
        .unwrap_or_else(|_| Response::new(full("internal error")))
}

fn preflight_response(req: &Request<Incoming>) -> Response<Body> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            "GET,HEAD,PUT,PATCH,POST,DELETE",
        );
    if let Some(requested) = req.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        builder = builder.header(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    builder
        .body(full(Bytes::new()))
        .unwrap_or_else(|_| Response::new(full("internal error")))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn success_response(mode: &ResponseMode, added: &AddedScene) -> Response<Body> {
    match mode {
        ResponseMode::Redirect { location } => redirect_response(location),
        ResponseMode::Link { viewer_url } => html_response(
            StatusCode::OK,
            format!(
                "<p>Scene <strong>{}</strong> added.</p>\n<a href=\"{}\">Open the tour</a>\n",
                escape_html(&added.scene.name),
                escape_html(viewer_url)
            ),
        ),
    }
}

async fn serve_static(req: Request<Incoming>, state: &ServerState) -> Response<Body> {
    match state.static_files.clone().oneshot(req).await {
        Ok(resp) => resp.map(|body| body.boxed_unsync()),
        Err(never) => match never {},
    }
}

// ============================================================================
// Upload
// ============================================================================

#[derive(Debug)]
enum UploadError {
    Multipart(multer::Error),
    Storage(StorageError),
}

impl From<multer::Error> for UploadError {
    fn from(err: multer::Error) -> Self {
        Self::Multipart(err)
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

#[derive(Debug, Default)]
struct ParsedUpload {
    fields: SceneFields,
    staged: Option<StagedAsset>,
}

async fn read_parts(
    multipart: &mut multer::Multipart<'_>,
    assets: &AssetStore,
    upload: &mut ParsedUpload,
) -> Result<(), UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            UPLOAD_FIELD => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                // A file input left empty is still sent, with no filename.
                if file_name.is_empty() || upload.staged.is_some() {
                    continue;
                }
                let mut writer = assets.begin_upload(&file_name).await?;
                loop {
                    match field.chunk().await {
                        Ok(Some(chunk)) => {
                            if let Err(e) = writer.write_chunk(&chunk).await {
                                writer.abort().await;
                                return Err(e.into());
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            writer.abort().await;
                            return Err(e.into());
                        }
                    }
                }
                upload.staged = Some(writer.finish().await?);
            }
            "sceneName" => upload.fields.scene_name = field.text().await?,
            "ath" => upload.fields.ath = field.text().await?,
            "atv" => upload.fields.atv = field.text().await?,
            "linkedscene" => upload.fields.linkedscene = field.text().await?,
            _ => {}
        }
    }
    Ok(())
}

/// Decode the multipart body, streaming the `pano` file into staging.
///
/// `Ok(None)` means the request carried no file; nothing was written then.
async fn read_upload(
    req: Request<Incoming>,
    assets: &AssetStore,
    max_upload_bytes: u64,
) -> Result<Option<(SceneFields, StagedAsset)>, UploadError> {
    let boundary = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok());
    let Some(boundary) = boundary else {
        return Ok(None);
    };

    let stream = BodyStream::new(req.into_body())
        .try_filter_map(|frame| async move { Ok::<_, hyper::Error>(frame.into_data().ok()) });
    let constraints = multer::Constraints::new()
        .size_limit(multer::SizeLimit::new().whole_stream(max_upload_bytes));
    let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

    let mut upload = ParsedUpload::default();
    if let Err(err) = read_parts(&mut multipart, assets, &mut upload).await {
        if let Some(staged) = upload.staged.take() {
            assets.discard(staged).await;
        }
        return Err(err);
    }
    let ParsedUpload { fields, staged } = upload;
    Ok(staged.map(|staged| (fields, staged)))
}

async fn handle_upload(req: Request<Incoming>, state: &ServerState) -> Response<Body> {
    tracing::info!(route = %state.config.route, "received upload");

    let (fields, staged) = match read_upload(
        req,
        state.service.assets(),
        state.config.max_upload_bytes,
    )
    .await
    {
        Ok(Some(parts)) => parts,
        Ok(None) => return text_response(StatusCode::BAD_REQUEST, MSG_NO_IMAGE),
        Err(UploadError::Multipart(
            multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. },
        )) => return text_response(StatusCode::PAYLOAD_TOO_LARGE, MSG_TOO_LARGE),
        Err(UploadError::Multipart(err)) => {
            tracing::warn!(error = %err, "rejected malformed multipart body");
            return text_response(StatusCode::BAD_REQUEST, MSG_MALFORMED);
        }
        Err(UploadError::Storage(err)) => {
            tracing::error!(error = %err, "failed to stage upload");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, MSG_PROCESSING_FAILED);
        }
    };

    match state.service.append(staged, fields).await {
        Ok(added) => success_response(&state.config.response, &added),
        Err(AuthoringError::Rejected(reason)) => {
            tracing::info!(reason = %reason, "scene rejected by policy");
            text_response(StatusCode::BAD_REQUEST, &reason.to_string())
        }
        Err(AuthoringError::Storage(err)) => {
            tracing::error!(error = %err, "upload processing failed");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, MSG_PROCESSING_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panotour_storage::StoredAsset;
    use panotour_tour::{NewScene, Scene};

    fn added(name: &str) -> AddedScene {
        AddedScene {
            scene: Scene::authored(NewScene {
                name: name.to_string(),
                ..NewScene::default()
            }),
            asset: StoredAsset {
                name: "1_a.jpg".to_string(),
                path: PathBuf::from("panos/1_a.jpg"),
                url: "panos/1_a.jpg".to_string(),
            },
            index: 0,
        }
    }

    #[test]
    fn response_mode_parse() {
        assert_eq!(
            ResponseMode::parse("Redirect", "/index.html", "/tour.html").unwrap(),
            ResponseMode::Redirect {
                location: "/index.html".to_string()
            }
        );
        assert_eq!(
            ResponseMode::parse("link", "/index.html", "/tour.html").unwrap(),
            ResponseMode::Link {
                viewer_url: "/tour.html".to_string()
            }
        );
        assert!(ResponseMode::parse("json", "/", "/").is_err());
    }

    #[test]
    fn redirect_mode_sets_location() {
        let mode = ResponseMode::Redirect {
            location: "/index.html".to_string(),
        };
        let resp = success_response(&mode, &added("Lobby"));
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/index.html")
        );
    }

    #[tokio::test]
    async fn link_mode_escapes_scene_name() {
        let mode = ResponseMode::Link {
            viewer_url: "/tour.html".to_string(),
        };
        let resp = success_response(&mode, &added("<Lobby>"));
        assert_eq!(resp.status(), StatusCode::OK);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("&lt;Lobby&gt;"), "{body}");
        assert!(body.contains("href=\"/tour.html\""), "{body}");
    }
}
