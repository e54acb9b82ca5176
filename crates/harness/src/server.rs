use tiny_http::{Header, Method, Request, Response};
use tracing::{debug, info, warn};

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::Error;

/// Loopback file server for the harness page, engine script and ROM.
pub struct StaticServer {
    server: Arc<tiny_http::Server>,
    worker: Option<JoinHandle<()>>,
    port: u16,
}

impl StaticServer {
    /// Binds `127.0.0.1:port` and serves files under `root`. Port 0 picks
    /// an ephemeral port.
    pub fn start<P: Into<PathBuf>>(port: u16, root: P) -> Result<Self, Error> {
        let root = root.into();
        let server = tiny_http::Server::http(("127.0.0.1", port)).map_err(|e| {
            match e.downcast_ref::<io::Error>() {
                Some(io) if io.kind() == io::ErrorKind::AddrInUse => Error::PortInUse(port),
                _ => Error::Server(e.to_string()),
            }
        })?;

        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(port);

        let server = Arc::new(server);
        let worker = {
            let server = server.clone();
            std::thread::Builder::new()
                .name(format!("static-server-{port}"))
                .spawn(move || {
                    for request in server.incoming_requests() {
                        handle(&root, request);
                    }
                })
                .map_err(|e| Error::Server(e.to_string()))?
        };

        info!(port, "static server listening");

        Ok(Self {
            server,
            worker: Some(worker),
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}/{}", self.port, path.trim_start_matches('/'))
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.server.unblock();
            if worker.join().is_err() {
                warn!(port = self.port, "static server worker panicked");
            }
            info!(port = self.port, "static server stopped");
        }
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle(root: &Path, request: Request) {
    let url = request.url().to_string();
    debug!(method = %request.method(), %url, "request");

    let response = if *request.method() != Method::Get {
        Response::from_string("method not allowed").with_status_code(405)
    } else {
        match resolve(root, &url) {
            Some(path) => match std::fs::read(&path) {
                Ok(data) => {
                    let mut response = Response::from_data(data);
                    if let Ok(header) =
                        Header::from_bytes(&b"Content-Type"[..], content_type(&path).as_bytes())
                    {
                        response = response.with_header(header);
                    }
                    response
                }
                Err(_) => Response::from_string("not found").with_status_code(404),
            },
            None => Response::from_string("forbidden").with_status_code(403),
        }
    };

    let status = response.status_code().0;
    if let Err(e) = request.respond(response) {
        warn!(%url, "unable to respond: {e}");
    } else if status != 200 {
        debug!(%url, status, "request not served");
    }
}

/// Maps a request path onto `root`. Paths that would leave the root are
/// rejected.
pub fn resolve(root: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let path = path.trim_start_matches('/');
    let path = if path.is_empty() || path.ends_with('/') {
        format!("{path}index.html")
    } else {
        path.to_string()
    };

    let mut resolved = root.to_path_buf();
    for component in Path::new(&path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => (),
            _ => return None,
        }
    }

    Some(resolved)
}

pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
