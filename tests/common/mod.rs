//! Shared test helper: an in-process mock DefectDojo.
//!
//! Serves just enough of the v2 API for the upload flow, keeps a small
//! mutable product/engagement state, and records every request so tests
//! can assert on exactly which calls were made.
#![allow(dead_code)] // each test binary uses a different subset

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use tiny_http::{Header, Method, Response, Server};

pub const CREATED_PRODUCT_ID: i64 = 42;
pub const CREATED_ENGAGEMENT_ID: i64 = 77;
pub const IMPORT_TEST_ID: i64 = 314;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
}

/// Remote-side state the mock mutates as the flow runs.
#[derive(Default)]
pub struct MockState {
    /// Existing product id, if the product lookup should find one.
    pub product_id: Option<i64>,
    /// Engagements returned by the list endpoint, as (id, name).
    pub engagements: Vec<(i64, String)>,
    /// When true, every engagement DELETE answers 403.
    pub fail_engagement_delete: bool,
}

pub struct MockDojo {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockDojo {
    /// Bind to an ephemeral port and serve requests on a background
    /// thread. The thread runs until the test process exits.
    pub fn start(state: MockState) -> MockDojo {
        let server = Server::http("127.0.0.1:0").expect("Failed to bind mock server");
        let port = server
            .server_addr()
            .to_ip()
            .expect("mock server should listen on an IP address")
            .port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            let state = Mutex::new(state);
            for mut request in server.incoming_requests() {
                let method = request.method().to_string();
                let url = request.url().to_string();
                let (path, query) = match url.split_once('?') {
                    Some((p, q)) => (p.to_string(), q.to_string()),
                    None => (url.clone(), String::new()),
                };

                // Drain the body before responding so keep-alive
                // connections stay usable for the next request.
                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);

                recorded.lock().unwrap().push(RecordedRequest {
                    method: method.clone(),
                    path: path.clone(),
                    query,
                });

                let mut state = state.lock().unwrap();
                let (status, body) = route(request.method(), &path, &mut state);
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .expect("static header"),
                    );
                let _ = request.respond(response);
            }
        });

        MockDojo {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of recorded calls matching a method and exact path.
    pub fn calls(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Number of recorded DELETEs under the engagements collection.
    pub fn engagement_deletes(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == "DELETE" && r.path.starts_with("/api/v2/engagements/"))
            .count()
    }
}

fn route(method: &Method, path: &str, state: &mut MockState) -> (u16, String) {
    match (method, path) {
        (Method::Get, "/api/v2/users/") => (
            200,
            r#"{"count":1,"results":[{"id":1,"username":"admin"}]}"#.to_string(),
        ),
        (Method::Get, "/api/v2/products/") => {
            let (count, results) = match state.product_id {
                Some(id) => (1, format!(r#"[{{"id":{id},"name":"existing"}}]"#)),
                None => (0, "[]".to_string()),
            };
            (200, format!(r#"{{"count":{count},"results":{results}}}"#))
        }
        (Method::Post, "/api/v2/products/") => {
            state.product_id = Some(CREATED_PRODUCT_ID);
            (201, format!(r#"{{"id":{CREATED_PRODUCT_ID}}}"#))
        }
        (Method::Get, "/api/v2/engagements/") => {
            let items: Vec<String> = state
                .engagements
                .iter()
                .map(|(id, name)| format!(r#"{{"id":{id},"name":"{name}"}}"#))
                .collect();
            (
                200,
                format!(
                    r#"{{"count":{},"results":[{}]}}"#,
                    items.len(),
                    items.join(",")
                ),
            )
        }
        (Method::Post, "/api/v2/engagements/") => {
            (201, format!(r#"{{"id":{CREATED_ENGAGEMENT_ID}}}"#))
        }
        (Method::Delete, _) if path.starts_with("/api/v2/engagements/") => {
            if state.fail_engagement_delete {
                return (403, r#"{"detail":"forbidden"}"#.to_string());
            }
            let id: i64 = path
                .trim_start_matches("/api/v2/engagements/")
                .trim_end_matches('/')
                .parse()
                .unwrap_or(-1);
            state.engagements.retain(|(eid, _)| *eid != id);
            (204, String::new())
        }
        (Method::Post, "/api/v2/import-scan/") => (
            201,
            format!(r#"{{"test":{IMPORT_TEST_ID},"findings_added":[{{}},{{}},{{}}]}}"#),
        ),
        _ => (404, r#"{"detail":"not found"}"#.to_string()),
    }
}
