//! # In-Process App Server
//!
//! [`App`] is a small router. Modules register routes on it from their `run`
//! hooks, then [`App::serve`] spawns the server loop as a `tokio` task.
//!
//! The server and its handles follow the actor pattern: every [`App`] clone
//! holds the sender half of an `mpsc` channel, each request carries a
//! `oneshot` sender for its [`Response`], and the loop handles one message at
//! a time. Because the app keeps its own sender alive, closing the channel is
//! not enough to stop it; [`App::close`] flips a `watch` flag instead and
//! [`App::join`] waits for the loop to drain.
//!
//! ```rust
//! use modwire_shop::app::{App, Request};
//! use modwire_shop::ShopError;
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = App::new(8);
//!     app.get("/ping", |_req| async { Ok::<_, ShopError>("pong") });
//!     app.serve();
//!
//!     let response = app.handle(Request::get("/ping")).await.unwrap();
//!     assert_eq!(response.status, 200);
//!     assert_eq!(response.body, "pong");
//!
//!     app.close();
//!     app.join().await;
//! }
//! ```

use crate::error::ShopError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: HashMap<String, String>,
    /// Filled from `:name` segments of the matched route.
    pub params: HashMap<String, String>,
    pub body: Value,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HashMap::new(),
            params: HashMap::new(),
            body: Value::Null,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("authorization", format!("Bearer {token}"))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn param<T: FromStr>(&self, name: &str) -> Result<T, ShopError> {
        self.params
            .get(name)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| ShopError::BadRequest(format!("invalid path parameter '{name}'")))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ShopError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ShopError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    fn from_error(e: &ShopError) -> Self {
        Self {
            status: e.status(),
            body: json!({ "success": false, "error": e.to_string() }),
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ShopError>> + Send>>;
type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

struct Route {
    method: Method,
    segments: Vec<String>,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: Method, path: &str) -> Option<HashMap<String, String>> {
        if self.method != method {
            return None;
        }
        let parts = split_path(path);
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (pattern, part) in self.segments.iter().zip(parts) {
            match pattern.strip_prefix(':') {
                Some(name) => {
                    params.insert(name.to_string(), part.to_string());
                }
                None if pattern == part => {}
                None => return None,
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

type RouteTable = Arc<RwLock<Vec<Route>>>;

enum AppRequest {
    Dispatch {
        request: Request,
        respond_to: oneshot::Sender<Response>,
    },
}

/// Server half: owns the receiver and processes requests sequentially.
struct AppServer {
    receiver: mpsc::Receiver<AppRequest>,
    routes: RouteTable,
    shutdown: watch::Receiver<bool>,
}

impl AppServer {
    async fn run(mut self) {
        let routes = self.routes.read().map(|table| table.len()).unwrap_or_default();
        info!(routes, "App server started");
        let mut handled = 0_usize;

        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(AppRequest::Dispatch { request, respond_to }) => {
                        let response = self.dispatch(request).await;
                        handled += 1;
                        let _ = respond_to.send(response);
                    }
                    None => break,
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(handled, "App server stopped");
    }

    async fn dispatch(&self, mut request: Request) -> Response {
        let method = request.method;
        let path = request.path.clone();

        let found = {
            let table = self.routes.read().unwrap_or_else(PoisonError::into_inner);
            table.iter().find_map(|route| {
                route
                    .matches(method, &path)
                    .map(|params| (Arc::clone(&route.handler), params))
            })
        };
        let Some((handler, params)) = found else {
            warn!(%method, %path, "No route");
            return Response::from_error(&ShopError::NoRoute {
                method: method.to_string(),
                path,
            });
        };

        request.params = params;
        match handler(request).await {
            Ok(body) => {
                debug!(%method, %path, "Handled");
                Response { status: 200, body }
            }
            Err(e) => {
                warn!(%method, %path, status = e.status(), error = %e, "Handler failed");
                Response::from_error(&e)
            }
        }
    }
}

/// Cloneable handle to the app: route registration, requests and shutdown.
#[derive(Clone)]
pub struct App {
    sender: mpsc::Sender<AppRequest>,
    pending: Arc<Mutex<Option<AppServer>>>,
    routes: RouteTable,
    shutdown: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl App {
    /// Creates the app; requests queue up to `buffer` deep once serving.
    pub fn new(buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let routes: RouteTable = Arc::default();
        let server = AppServer {
            receiver,
            routes: Arc::clone(&routes),
            shutdown: shutdown_rx,
        };
        Self {
            sender,
            pending: Arc::new(Mutex::new(Some(server))),
            routes,
            shutdown: Arc::new(shutdown),
            task: Arc::default(),
        }
    }

    pub fn route<F, Fut, T>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ShopError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let handler: Handler = Arc::new(move |request: Request| -> HandlerFuture {
            let fut = handler(request);
            Box::pin(async move {
                let body = fut.await?;
                Ok::<_, ShopError>(serde_json::to_value(body)?)
            })
        });
        debug!(%method, path, "Route registered");
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Route {
                method,
                segments: split_path(path).into_iter().map(str::to_string).collect(),
                handler,
            });
    }

    pub fn get<F, Fut, T>(&self, path: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ShopError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.route(Method::Get, path, handler)
    }

    pub fn post<F, Fut, T>(&self, path: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ShopError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.route(Method::Post, path, handler)
    }

    pub fn put<F, Fut, T>(&self, path: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ShopError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.route(Method::Put, path, handler)
    }

    pub fn delete<F, Fut, T>(&self, path: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ShopError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.route(Method::Delete, path, handler)
    }

    /// Registered routes as `METHOD /path`, in registration order.
    pub fn route_table(&self) -> Vec<String> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|route| format!("{} /{}", route.method, route.segments.join("/")))
            .collect()
    }

    /// Spawns the server loop. Must be called inside a `tokio` runtime;
    /// later calls do nothing.
    pub fn serve(&self) {
        let Some(server) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            debug!("App already serving");
            return;
        };
        let handle = tokio::spawn(server.run());
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn is_serving(&self) -> bool {
        let started = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none();
        started && !*self.shutdown.borrow()
    }

    /// Sends a request to the server loop and waits for its response.
    pub async fn handle(&self, request: Request) -> Result<Response, ShopError> {
        if !self.is_serving() {
            return Err(ShopError::ServerClosed);
        }
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(AppRequest::Dispatch {
                request,
                respond_to,
            })
            .await
            .map_err(|_| ShopError::ServerClosed)?;
        response.await.map_err(|_| ShopError::ServerDropped)
    }

    /// Signals the server loop to stop. Does not wait.
    pub fn close(&self) {
        if !self.shutdown.send_replace(true) {
            info!("App server closing");
        }
    }

    /// Waits for the server loop to finish after [`App::close`].
    pub async fn join(&self) {
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "App server task failed");
            }
        }
    }
}
