//! Shared fixtures: in-process collaborators and request helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use clevermcp::api::ApiServer;
use clevermcp::clever::{Course, CoursesClient};
use clevermcp::devices::{DeviceStore, InstalledApp};
use clevermcp::mcp::{SseSessions, ToolContext};
use clevermcp::{Config, Error, Result};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Device store that records how often it was queried
#[derive(Default)]
pub struct FakeDevices {
    pub apps: Vec<InstalledApp>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeDevices {
    pub fn with_apps(apps: Vec<InstalledApp>) -> Self {
        Self {
            apps,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceStore for FakeDevices {
    async fn apps_for_device(&self, _device_id: &str) -> Result<Vec<InstalledApp>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Store("database is locked".to_string()));
        }
        Ok(self.apps.clone())
    }
}

/// Courses client with a canned answer
pub enum FakeCourses {
    Courses(Vec<Course>),
    Upstream(u16, &'static str),
}

#[async_trait]
impl CoursesClient for FakeCourses {
    async fn fetch_courses(&self) -> Result<Vec<Course>> {
        match self {
            FakeCourses::Courses(c) => Ok(c.clone()),
            FakeCourses::Upstream(status, message) => Err(Error::Upstream {
                status: Some(*status),
                message: message.to_string(),
            }),
        }
    }
}

pub fn app(name: &str, version: &str, vendor: &str, needs_update: bool) -> InstalledApp {
    InstalledApp {
        application_name: name.to_string(),
        vendor: vendor.to_string(),
        app_version: version.to_string(),
        install_date: Some("2024-01-10".to_string()),
        last_update: Some("2024-03-02".to_string()),
        needs_update,
    }
}

pub fn courses(n: usize) -> Vec<Course> {
    (1..=n)
        .map(|i| Course {
            name: Some(format!("Course {}", i)),
            number: Some(format!("C-{}", i)),
            id: Some(format!("id{}", i)),
        })
        .collect()
}

pub struct TestApp {
    pub router: Router,
    pub sessions: Arc<SseSessions>,
    pub devices: Arc<FakeDevices>,
}

pub fn test_app(devices: FakeDevices, courses: FakeCourses) -> TestApp {
    test_app_with_config(&Config::default(), devices, courses)
}

pub fn test_app_with_config(config: &Config, devices: FakeDevices, courses: FakeCourses) -> TestApp {
    let devices = Arc::new(devices);
    let ctx = ToolContext {
        devices: devices.clone(),
        courses: Arc::new(courses),
    };
    let server = ApiServer::from_config(config, ctx);
    TestApp {
        router: server.router(),
        sessions: server.sessions(),
        devices,
    }
}

pub fn default_app() -> TestApp {
    test_app(FakeDevices::default(), FakeCourses::Courses(Vec::new()))
}

pub async fn send(router: &Router, method: &str, path: &str, body: &str) -> (StatusCode, Bytes) {
    let req = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, bytes)
}

/// POST a JSON-RPC body to /mcp and parse the JSON response
pub async fn rpc(router: &Router, body: Value) -> (StatusCode, Value) {
    let (status, bytes) = send(router, "POST", "/mcp", &body.to_string()).await;
    let value = serde_json::from_slice(&bytes).unwrap();
    (status, value)
}

pub async fn call_tool(router: &Router, name: &str, arguments: Value) -> (StatusCode, Value) {
    rpc(
        router,
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    )
    .await
}
