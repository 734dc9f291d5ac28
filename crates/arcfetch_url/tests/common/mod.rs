#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{Cursor, Write},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use arcfetch_url::{FetchExtractEngine, LastModified};
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderMap, Method, Response, StatusCode, Uri,
        header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED, RANGE},
    },
    routing::post,
    serve,
};
use reqwest_middleware::ClientWithMiddleware;
use retry_policies::policies::ExponentialBackoff;
use tokio::net::TcpListener;
use url::Url;

pub const MARCH: &str = "Fri, 01 Mar 2024 12:00:00 GMT";
pub const MARCH_MILLIS: i64 = 1_709_294_400_000;
pub const APRIL: &str = "Mon, 01 Apr 2024 12:00:00 GMT";
pub const APRIL_MILLIS: i64 = 1_711_972_800_000;

pub const SEARCH_PATH: &str = "/artifactory/api/search/aql";

#[derive(Clone)]
pub struct Artifact {
    pub body: Vec<u8>,
    pub last_modified: Option<&'static str>,
    /// Abort the next `GET` after this many bytes.
    pub interrupt_after: Option<usize>,
    /// Requests without exactly this `Authorization` header get a 401.
    pub authorization: Option<&'static str>,
}

impl Artifact {
    pub fn new(body: Vec<u8>, last_modified: Option<&'static str>) -> Self {
        Self {
            body,
            last_modified,
            interrupt_after: None,
            authorization: None,
        }
    }

    pub fn with_authorization(mut self, authorization: &'static str) -> Self {
        self.authorization = Some(authorization);
        self
    }
}

/// A request as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

impl Recorded {
    pub fn new(method: &str, path: &str, authorization: Option<&str>) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            authorization: authorization.map(str::to_string),
        }
    }
}

#[derive(Clone, Default)]
struct ServerState {
    files: Arc<Mutex<HashMap<String, Artifact>>>,
    downloads: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<(String, String)>>>,
    search_response: Arc<Mutex<String>>,
    search_authorization: Arc<Mutex<Option<&'static str>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl ServerState {
    /// Records the request and checks its `Authorization` header against
    /// `required`.
    fn admit(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        required: Option<&str>,
    ) -> Result<(), Response<Body>> {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        self.requests
            .lock()
            .unwrap()
            .push(Recorded::new(method.as_str(), uri.path(), authorization));

        match required {
            Some(required) if authorization != Some(required) => Err(Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body(Body::empty())
                .unwrap()),
            _ => Ok(()),
        }
    }
}

/// An http server serving artifacts and an AQL search endpoint.
pub struct TestHttpServer {
    base: Url,
    state: ServerState,
}

impl TestHttpServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = Url::parse(&format!("http://{addr}/")).unwrap();

        let state = ServerState::default();
        *state.search_response.lock().unwrap() = r#"{"results":[]}"#.to_string();

        let router = Router::new()
            .route(SEARCH_PATH, post(search))
            .fallback(serve_file)
            .with_state(state.clone());

        let server = serve(listener, router);
        tokio::spawn(async move {
            let _ = server.await;
        });

        Self { base, state }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path.trim_start_matches('/')).unwrap()
    }

    /// `http://<addr>/artifactory/<repository>/<folder>`
    pub fn artifactory_folder(&self, repository: &str, folder: &str) -> String {
        format!("{}artifactory/{repository}/{folder}", self.base)
    }

    pub fn put(&self, path: &str, artifact: Artifact) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(path.to_string(), artifact);
    }

    pub fn set_search_response(&self, json: &str) {
        *self.state.search_response.lock().unwrap() = json.to_string();
    }

    /// Number of `GET` requests for artifacts.
    pub fn downloads(&self) -> usize {
        self.state.downloads.load(Ordering::SeqCst)
    }

    /// Search requests without exactly this `Authorization` header get a 401.
    pub fn require_search_authorization(&self, authorization: &'static str) {
        *self.state.search_authorization.lock().unwrap() = Some(authorization);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// `(content type, body)` of every search request.
    pub fn queries(&self) -> Vec<(String, String)> {
        self.state.queries.lock().unwrap().clone()
    }
}

async fn search(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response<Body> {
    let required = *state.search_authorization.lock().unwrap();
    if let Err(response) = state.admit(&method, &uri, &headers, required) {
        return response;
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.queries.lock().unwrap().push((content_type, body));

    let response = state.search_response.lock().unwrap().clone();
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(response))
        .unwrap()
}

async fn serve_file(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response<Body> {
    let artifact = state.files.lock().unwrap().get(uri.path()).cloned();
    let Some(artifact) = artifact else {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap();
    };
    if let Err(response) = state.admit(&method, &uri, &headers, artifact.authorization) {
        return response;
    }

    let mut response = Response::builder().header(CONTENT_TYPE, "application/octet-stream");
    if let Some(last_modified) = artifact.last_modified {
        response = response.header(LAST_MODIFIED, last_modified);
    }
    if method != Method::GET {
        return response
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, artifact.body.len())
            .body(Body::empty())
            .unwrap();
    }
    state.downloads.fetch_add(1, Ordering::SeqCst);

    if let Some(cut) = artifact.interrupt_after {
        let mut updated = artifact.clone();
        updated.interrupt_after = None;
        state
            .files
            .lock()
            .unwrap()
            .insert(uri.path().to_string(), updated);

        let head = artifact.body[..cut].to_vec();
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(head),
            Err(std::io::Error::other("connection reset")),
        ];
        return response
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, artifact.body.len())
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();
    }

    let range_start = headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
        .and_then(|value| value.strip_suffix('-'))
        .and_then(|value| value.parse::<usize>().ok());
    match range_start {
        Some(start) if start < artifact.body.len() => {
            let rest = artifact.body[start..].to_vec();
            response
                .status(StatusCode::PARTIAL_CONTENT)
                .header(CONTENT_LENGTH, rest.len())
                .body(Body::from(rest))
                .unwrap()
        }
        _ => response
            .status(StatusCode::OK)
            .header(CONTENT_LENGTH, artifact.body.len())
            .body(Body::from(artifact.body))
            .unwrap(),
    }
}

pub fn client() -> ClientWithMiddleware {
    ClientWithMiddleware::from(reqwest::Client::new())
}

pub fn fast_retry_policy() -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(1), Duration::from_millis(5))
        .build_with_max_retries(3)
}

pub fn engine(destination: &Path) -> FetchExtractEngine {
    FetchExtractEngine::new(client(), destination).with_retry_policy(fast_retry_policy())
}

/// A zip with the given `(name, contents)` file entries.
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn tar_gz_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn marker_time(destination: &Path, file_name: &str) -> Option<LastModified> {
    arcfetch_url::FreshnessStore::new(destination).load(file_name)
}

/// Names in `dir`, sorted.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs_err::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
