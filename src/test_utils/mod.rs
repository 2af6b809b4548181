//! Shared fixtures for unit tests: in-process HTTP servers and in-memory
//! zip archives.

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::io::Write;
use zip::write::SimpleFileOptions;

/// Spawn an HTTP server answering every path with `body`, returning its
/// base URL.
pub async fn serve_bytes(body: Vec<u8>) -> String {
    let app = Router::new().fallback(move || {
        let body = body.clone();
        async move { body }
    });
    spawn(app).await
}

/// Spawn an HTTP server answering every path with the given status and an
/// empty body.
pub async fn serve_status(status: u16) -> String {
    let app = Router::new().fallback(move || async move {
        (StatusCode::from_u16(status).unwrap(), Vec::<u8>::new())
    });
    spawn(app).await
}

/// Spawn an HTTP server answering `path` with a JSON body and everything
/// else with 404.
pub async fn serve_json(path: &str, json: String) -> String {
    let app = Router::new().route(
        path,
        get(move || {
            let json = json.clone();
            async move {
                ([(axum::http::header::CONTENT_TYPE, "application/json")], json)
            }
        }),
    );
    spawn(app).await
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Build an in-memory zip archive from `(name, content)` pairs; names
/// ending in `/` become directory entries.
pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}
