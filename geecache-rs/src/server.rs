//! Contains the HTTP server which answers value requests of other nodes.
//!
//! Opens a server socket on the specified port (**server.port** in the config or 8001 as fallback)
//! and binds it to the selected IP (**server.host** in the config or 0.0.0.0 as fallback). Each
//! request of the form `GET /_geecache/<group>/<key>` is answered with the raw bytes of the
//! requested value.
//!
//! Note that the server periodically tries to bind the socket to the selected port. Therefore a
//! "new" instance can be started while the "old" one bleeds out and the port is "handed through"
//! with minimal downtime. The server also listens to change events of the config and relocates to
//! another port or host if required.
//!
//! # Example
//!
//! ```no_run
//! use geecache::builder::Builder;
//!
//! #[tokio::main]
//! async fn main() {
//!     let node = Builder::new().enable_all().build().await;
//!
//!     // Specify a minimal config so that we run on a different port than a production instance.
//!     node.config().load_from_string("
//!         server:
//!             port: 9001
//!     ", None).unwrap();
//!
//!     node.server().unwrap().event_loop().await;
//! }
//! ```
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hyper::header::CONTENT_TYPE;
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use tokio::net::{TcpListener, TcpStream};

use crate::node::Node;
use crate::spawn;

/// Specifies the timeout when waiting for a new incoming connection.
///
/// When waiting for a new connection we need to interrupt this every once in a while so that
/// we can check if the node has been shut down.
const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Specifies the interval in which a failed bind is retried.
const BIND_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Serves the values of all groups of a node via HTTP.
pub struct Server {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    local_address: Mutex<Option<SocketAddr>>,
    node: Arc<Node>,
}

impl Server {
    /// Creates a new server for the given node.
    ///
    /// Note that this will not technically start the server. This has to be done manually
    /// via [event_loop](Server::event_loop) as it is most probably done in the main thread.
    pub fn new(node: Arc<Node>) -> Self {
        Server {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            local_address: Mutex::new(None),
            node,
        }
    }

    /// Returns the address the server socket is currently bound to.
    ///
    /// This is especially useful if port 0 was configured to let the operating system choose a
    /// free port.
    pub fn local_address(&self) -> Option<SocketAddr> {
        *self.local_address.lock().unwrap()
    }

    /// Determines if the server socket should keep listening for incoming connections.
    ///
    /// In contrast to **Node::is_running** this is not used to control the shutdown of the
    /// server. Rather we toggle this flag to false if a config and therefore address change was
    /// detected. This way **server_loop** will exit and a new server socket for the appropriate
    /// address will be setup by the **event_loop**.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the event loop in a separate task.
    ///
    /// This is most probably used by test scenarios where the tests itself run in the main thread.
    pub fn fork(server: &Arc<Server>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server socket is open.
    ///
    /// Just like **fork** this is intended to be used in test environments.
    pub async fn fork_and_await(server: &Arc<Server>) {
        Server::fork(server);

        while server.local_address().is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Tries to open a server socket on the configured address to serve incoming requests.
    ///
    /// Once the socket is bound, we enter the [server_loop](Server::server_loop). Once this loop
    /// returns, either the node is no longer running and we exit, or the config has changed and we
    /// try to bind the server to the new address.
    pub async fn event_loop(&self) {
        let mut address = String::new();
        let mut last_bind_error_reported: Option<Instant> = None;

        while self.node.is_running() {
            if !self.is_running() {
                address = self.node.config().current().server_address();
                self.running.store(true, Ordering::Release);
            }

            match TcpListener::bind(&address).await {
                Ok(listener) => {
                    let local_address = listener.local_addr().ok();
                    log::info!(
                        "Opened server socket on {} ({})...",
                        &address,
                        local_address
                            .map(|addr| addr.to_string())
                            .unwrap_or_else(|| "<unknown>".to_owned())
                    );
                    *self.current_address.lock().unwrap() = Some(address.clone());
                    *self.local_address.lock().unwrap() = local_address;

                    self.server_loop(&listener).await;

                    *self.local_address.lock().unwrap() = None;
                    log::info!("Closing server socket on {}.", &address);
                }
                Err(error) => {
                    // Only report every 5s, as we retry every 500ms...
                    if last_bind_error_reported
                        .map(|reported| reported.elapsed().as_secs() >= 5)
                        .unwrap_or(true)
                    {
                        log::error!(
                            "Cannot open server address {}: {}. Retrying every 500ms...",
                            &address,
                            error
                        );
                        last_bind_error_reported = Some(Instant::now());
                    }
                    tokio::time::sleep(BIND_RETRY_INTERVAL).await;
                }
            }
        }
    }

    /// Accepts incoming connections until the node is terminated or the server address changes.
    async fn server_loop(&self, listener: &TcpListener) {
        let mut config_changed_flag = self.node.config().notifier();

        while self.node.is_running() && self.is_running() {
            tokio::select! {
                // The timeout makes sure node.is_running() is checked every once in a while...
                timeout_stream = tokio::time::timeout(CONNECT_WAIT_TIMEOUT, listener.accept()) => {
                    match timeout_stream {
                        Ok(Ok((stream, _))) => self.handle_new_connection(stream),
                        Ok(Err(error)) => {
                            log::error!("Failed to accept a connection: {}", error);
                            return;
                        }
                        Err(_) => (),
                    }
                }
                _ = config_changed_flag.recv() => {
                    let new_address = self.node.config().current().server_address();
                    if let Some(current_address) = &*self.current_address.lock().unwrap() {
                        if current_address != &new_address {
                            log::info!("Server address has changed. Restarting server socket...");

                            // Force the event_loop to re-evaluate the expected server address...
                            self.running.store(false, Ordering::Release);
                            return;
                        }
                    }
                }
                _ = self.node.await_termination() => (),
            }
        }
    }

    /// Serves all requests of a new connection in a separate task.
    fn handle_new_connection(&self, stream: TcpStream) {
        let node = self.node.clone();
        spawn!(async move {
            let _ = stream.set_nodelay(true);
            let peer_address = stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "<unknown>".to_owned());
            log::debug!("Opened connection from {}...", peer_address);

            let service = service_fn(move |request| {
                let node = node.clone();
                async move { Ok::<_, Infallible>(handle_request(&node, request).await) }
            });
            if let Err(error) = Http::new().serve_connection(stream, service).await {
                log::debug!(
                    "An IO error occurred in connection {}: {}",
                    peer_address,
                    error
                );
            }

            log::debug!("Closing connection to {}...", peer_address);
        });
    }
}

/// Answers a single `GET <base path><group>/<key>` request.
async fn handle_request(node: &Node, request: Request<Body>) -> Response<Body> {
    log::debug!(
        "[{}] {} {}",
        node.pool().self_url(),
        request.method(),
        request.uri().path()
    );

    if request.method() != Method::GET {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    let (group_name, key) = match parse_path(node.pool().base_path(), request.uri().path()) {
        Some(path) => path,
        None => return text_response(StatusCode::BAD_REQUEST, "invalid path"),
    };

    let group = match node.groups().find(&group_name) {
        Some(group) => group,
        None => {
            return text_response(
                StatusCode::NOT_FOUND,
                &format!("group {} not found", group_name),
            )
        }
    };

    match group.get(&key).await {
        Ok(value) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(value.byte_slice()))
            .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "")),
        Err(error) => text_response(StatusCode::INTERNAL_SERVER_ERROR, &error.to_string()),
    }
}

/// Splits `<base path><group>/<key>` into its decoded group name and key.
fn parse_path(base_path: &str, path: &str) -> Option<(String, String)> {
    let (group, key) = path.strip_prefix(base_path)?.split_once('/')?;

    Some((
        urlencoding::decode(group).ok()?.into_owned(),
        urlencoding::decode(key).ok()?.into_owned(),
    ))
}

fn text_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = status;

    response
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::server::{parse_path, Server};
    use hyper::{Body, Client, Method, Request, StatusCode};
    use std::time::Duration;

    async fn fetch(url: String) -> (StatusCode, String) {
        let response = Client::new().get(url.parse().unwrap()).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn paths_are_split_into_group_and_key() {
        assert_eq!(
            parse_path("/_geecache/", "/_geecache/scores/Tom"),
            Some(("scores".to_owned(), "Tom".to_owned()))
        );
        assert_eq!(
            parse_path("/_geecache/", "/_geecache/scores/a%2Fb%20c"),
            Some(("scores".to_owned(), "a/b c".to_owned()))
        );
        assert_eq!(parse_path("/_geecache/", "/_geecache/scores"), None);
        assert_eq!(parse_path("/_geecache/", "/other/scores/Tom"), None);
    }

    #[test]
    fn values_are_served_via_http() {
        crate::testing::test_async(async {
            let node = Builder::new().enable_server().build().await;
            node.config()
                .load_from_string("server:\n    host: 127.0.0.1\n    port: 0", None)
                .unwrap();
            let _ = node
                .create_group("scores", 0, |key: &str| -> anyhow::Result<Vec<u8>> {
                    match key {
                        "Tom" => Ok(b"630".to_vec()),
                        _ => Err(anyhow::anyhow!("{} not exist", key)),
                    }
                })
                .unwrap();

            let server = node.server().unwrap();
            Server::fork_and_await(&server).await;
            let base = format!("http://{}", server.local_address().unwrap());

            assert_eq!(
                fetch(format!("{}/_geecache/scores/Tom", base)).await,
                (StatusCode::OK, "630".to_owned())
            );
            assert_eq!(
                fetch(format!("{}/_geecache/unknown/Tom", base)).await,
                (StatusCode::NOT_FOUND, "group unknown not found".to_owned())
            );
            assert_eq!(
                fetch(format!("{}/_geecache/scores", base)).await.0,
                StatusCode::BAD_REQUEST
            );
            assert_eq!(
                fetch(format!("{}/somewhere/else", base)).await.0,
                StatusCode::BAD_REQUEST
            );

            let (status, message) = fetch(format!("{}/_geecache/scores/Jack", base)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(message.contains("Jack not exist"), true);

            let response = Client::new()
                .request(
                    Request::builder()
                        .method(Method::DELETE)
                        .uri(format!("{}/_geecache/scores/Tom", base))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

            node.terminate();
        });
    }

    #[test]
    fn the_server_follows_address_changes() {
        crate::testing::test_async(async {
            let node = Builder::new().enable_server().build().await;
            node.config()
                .load_from_string("server:\n    host: 127.0.0.1\n    port: 0", None)
                .unwrap();

            let server = node.server().unwrap();
            Server::fork_and_await(&server).await;
            let first_address = server.local_address().unwrap();

            // Moving to another host forces the server to re-bind its socket...
            node.config()
                .load_from_string("server:\n    host: localhost\n    port: 0", None)
                .unwrap();

            let mut attempts = 0;
            while server.local_address().map(|addr| addr == first_address) != Some(false) {
                attempts += 1;
                assert_eq!(attempts < 100, true);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            node.terminate();
        });
    }
}
