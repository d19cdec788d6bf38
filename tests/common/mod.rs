#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use profilesite::test_utils::test_helpers;
use sqlx::SqlitePool;
use std::{collections::HashMap, path::Path};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "----profilesite-test-boundary";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn is_redirect_to(&self, path: &str) -> bool {
        self.status.is_redirection() && self.location() == Some(path)
    }
}

/// The whole router over an in-memory database, with a cookie jar so that
/// consecutive requests share one session.
pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pictures: TempDir,
    cookies: HashMap<String, String>,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = test_helpers::create_test_db().await.unwrap();
        let pictures = TempDir::new().unwrap();
        std::fs::write(pictures.path().join("default.jpg"), b"placeholder").unwrap();

        let router = test_helpers::test_app(pool.clone(), pictures.path())
            .await
            .unwrap();

        Self {
            router,
            pool,
            pictures,
            cookies: HashMap::new(),
        }
    }

    pub fn picture_dir(&self) -> &Path {
        self.pictures.path()
    }

    pub fn picture_exists(&self, filename: &str) -> bool {
        self.pictures.path().join(filename).exists()
    }

    /// Sorted names of every file in the picture directory.
    pub fn stored_pictures(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.pictures.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn forget_cookies(&mut self) {
        self.cookies.clear();
    }

    pub async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let mut request = request;
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();

        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let raw = set_cookie.to_str().unwrap();
            let pair = raw.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() || raw.contains("Max-Age=0") {
                self.cookies.remove(name.trim());
            } else {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        }
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();

        self.send(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Posts `fields` as multipart; `file` is `(filename, bytes)` for the
    /// `picture` part.
    pub async fn post_multipart(
        &mut self,
        path: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> TestResponse {
        let body = multipart_body(fields, file);

        self.send(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Loads `path` and returns the CSRF token embedded in its form.
    pub async fn csrf_token(&mut self, path: &str) -> String {
        let page = self.get(path).await;
        extract_csrf_token(&page.body)
            .unwrap_or_else(|| panic!("no csrf token on {path}: {}", page.body))
    }

    pub async fn register(
        &mut self,
        full_name: &str,
        username: &str,
        email: &str,
        password: &str,
    ) -> TestResponse {
        let token = self.csrf_token("/register").await;
        self.post_form(
            "/register",
            &[
                ("full_name", full_name),
                ("username", username),
                ("email", email),
                ("password", password),
                ("confirm_password", password),
                ("csrf_token", &token),
            ],
        )
        .await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        let token = self.csrf_token("/login").await;
        self.post_form(
            "/login",
            &[
                ("email", email),
                ("password", password),
                ("csrf_token", &token),
            ],
        )
        .await
    }

    /// Creates an account directly in the database and logs it in.
    pub async fn logged_in_user(&mut self, username: &str) -> i64 {
        let email = format!("{username}@example.com");
        let user_id = test_helpers::insert_test_user(&self.pool, username, &email, "password123")
            .await
            .unwrap();
        let response = self.login(&email, "password123").await;
        assert!(response.is_redirect_to("/dashboard"), "login failed");
        user_id
    }
}

pub fn extract_csrf_token(html: &str) -> Option<String> {
    let marker = r#"name="csrf_token" value=""#;
    let start = html.find(marker)? + marker.len();
    let end = html[start..].find('"')? + start;
    Some(html[start..end].to_string())
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"picture\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
