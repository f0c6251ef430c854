//! `JenkinsClient` against a scripted axum server on a local socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use cdprobe_core::{
    trigger_and_wait_for_finish, BuildClient, BuildOutcome, BuildParameters, ClientError,
    JobCatalog,
};
use cdprobe_jenkins::{JenkinsAuth, JenkinsClient, JenkinsConfig};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

type Routes = HashMap<String, Vec<(u16, String)>>;

/// Answers `METHOD /target` with scripted responses. Each route pops its
/// queue until one response is left, which then repeats. Unknown routes 404.
#[derive(Clone, Default)]
struct FakeServer {
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeServer {
    fn route(&self, method: &str, target: &str, responses: &[(u16, &str)]) {
        self.routes.lock().unwrap().insert(
            format!("{method} {target}"),
            responses
                .iter()
                .map(|(status, body)| (*status, body.to_string()))
                .collect(),
        );
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self, method: &str, target: &str) -> (u16, String) {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&format!("{method} {target}")) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => (404, "Not Found".to_string()),
        }
    }

    /// Serve on an ephemeral local port; returns the base URL.
    async fn start(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().fallback(respond).with_state(self);
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}/")
    }
}

async fn respond(
    State(server): State<FakeServer>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    server.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        target: target.clone(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body,
    });

    let (status, body) = server.next_response(method.as_str(), &target);
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

fn client_for(base: &str, auth: JenkinsAuth) -> JenkinsClient {
    JenkinsClient::new(JenkinsConfig::new(base, auth).unwrap()).unwrap()
}

fn bearer() -> JenkinsAuth {
    JenkinsAuth::Bearer("tok".to_string())
}

#[tokio::test]
async fn test_last_build_decodes_and_authenticates() {
    let server = FakeServer::default();
    server.route(
        "GET",
        "/job/demo/job/build/lastBuild/api/json",
        &[(200, r#"{"number": 7, "building": true, "result": null}"#)],
    );
    let base = server.clone().start().await;
    let client = client_for(
        &base,
        JenkinsAuth::ApiToken {
            username: "admin".to_string(),
            token: "secret".to_string(),
        },
    );

    let build = client.last_build("demo/build").await.unwrap();

    assert_eq!(build.number, 7);
    assert!(build.building);
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    // base64("admin:secret")
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Basic YWRtaW46c2VjcmV0")
    );
}

#[tokio::test]
async fn test_missing_job_is_not_found() {
    let server = FakeServer::default();
    let base = server.clone().start().await;
    let client = client_for(&base, bearer());

    let err = client.job("nope").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(
        server.requests()[0].authorization.as_deref(),
        Some("Bearer tok")
    );
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let server = FakeServer::default();
    server.route("POST", "/job/demo/build", &[(403, "No valid crumb")]);
    let base = server.clone().start().await;
    let client = client_for(&base, bearer());

    let err = client.trigger_build("demo", None).await.unwrap_err();

    match err {
        ClientError::Http { status, body, .. } => {
            assert_eq!(status, 403);
            assert_eq!(body, "No valid crumb");
        }
        other => panic!("expected HTTP error, got {other}"),
    }
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let server = FakeServer::default();
    server.route("GET", "/job/demo/3/api/json", &[(200, "<html>oops</html>")]);
    let base = server.clone().start().await;
    let client = client_for(&base, bearer());

    let err = client.build("demo", 3).await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn test_parameters_use_build_with_parameters() {
    let server = FakeServer::default();
    server.route(
        "POST",
        "/job/import/buildWithParameters?pipeline=main&repository=https%3A%2F%2Fgit.example%2Fapp.git",
        &[(201, "")],
    );
    let base = server.clone().start().await;
    let client = client_for(&base, bearer());
    let params = BuildParameters::from([
        ("repository".to_string(), "https://git.example/app.git".to_string()),
        ("pipeline".to_string(), "main".to_string()),
    ]);

    client.trigger_build("import", Some(&params)).await.unwrap();
    assert_eq!(server.requests()[0].method, "POST");
}

#[tokio::test]
async fn test_job_listing_and_management() {
    let server = FakeServer::default();
    server.route(
        "GET",
        "/api/json?tree=jobs%5Bname%2Curl%2CfullName%5D",
        &[(
            200,
            r#"{"jobs": [{"name": "a", "url": "http://j/job/a/"}, {"name": "b", "fullName": "b", "url": "http://j/job/b/"}]}"#,
        )],
    );
    server.route("POST", "/createItem?name=demo", &[(200, "")]);
    server.route("POST", "/job/demo/doDelete", &[(200, "")]);
    let base = server.clone().start().await;
    let client = client_for(&base, bearer());

    let jobs = client.jobs().await.unwrap();
    assert_eq!(
        jobs.iter().map(|j| j.name.as_str()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );

    client.create_job("demo", "<project/>").await.unwrap();
    let create = server
        .requests()
        .into_iter()
        .find(|r| r.target.starts_with("/createItem"))
        .unwrap();
    assert_eq!(create.body, "<project/>");
    assert_eq!(create.content_type.as_deref(), Some("application/xml"));

    client.delete_job("demo").await.unwrap();
    assert!(client.delete_job("other").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_lifecycle_over_http() {
    let server = FakeServer::default();
    server.route(
        "GET",
        "/job/demo/job/build/lastBuild/api/json",
        &[
            (200, r#"{"number": 3, "building": false, "result": "SUCCESS"}"#),
            (200, r#"{"number": 4, "building": true, "result": null}"#),
        ],
    );
    server.route("POST", "/job/demo/job/build/build", &[(201, "")]);
    server.route(
        "GET",
        "/job/demo/job/build/4/api/json",
        &[(200, r#"{"number": 4, "building": false, "result": "SUCCESS"}"#)],
    );
    let base = server.clone().start().await;
    let client = client_for(&base, bearer());

    let result = trigger_and_wait_for_finish(
        &client,
        "demo/build",
        Duration::from_secs(20),
        Duration::from_secs(20),
    )
    .await;

    assert_eq!(BuildOutcome::from_wait(&result), BuildOutcome::Succeeded);
    let targets: Vec<String> = server
        .requests()
        .into_iter()
        .map(|r| format!("{} {}", r.method, r.target))
        .collect();
    assert_eq!(
        targets,
        vec![
            "GET /job/demo/job/build/lastBuild/api/json",
            "POST /job/demo/job/build/build",
            "GET /job/demo/job/build/lastBuild/api/json",
            "GET /job/demo/job/build/4/api/json",
        ]
    );
}

#[tokio::test]
async fn test_organisation_scan_result_from_console() {
    let server = FakeServer::default();
    server.route(
        "GET",
        "/job/acme/computation/consoleText",
        &[
            (200, "Starting organization scan...\n"),
            (200, "Starting organization scan...\nFinished: SUCCESS\n"),
        ],
    );
    let base = server.clone().start().await;
    let client = client_for(&base, bearer());

    assert_eq!(client.organisation_scan_result("acme").await.unwrap(), None);
    assert_eq!(
        client.organisation_scan_result("acme").await.unwrap().as_deref(),
        Some("SUCCESS")
    );
    assert!(client
        .organisation_scan_result("other")
        .await
        .unwrap_err()
        .is_not_found());
}
