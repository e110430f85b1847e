//! テスト用の共通ヘルパー
#![allow(dead_code)]

use webweave::{Method, Request, Response, Server};

/// テーブル駆動テストの1ケース
pub struct Test {
    pub method: Method,
    pub path: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
    pub body: Option<&'static str>,
    pub expected_status: u16,
    pub expected_body: &'static str,
}

/// リクエストを組み立てる
pub fn build_request(
    method: Method,
    path: &str,
    body: Option<&str>,
    headers: &[(&str, &str)],
    cookies: &[(String, String)],
) -> Request {
    let mut req = Request::new(method, path).with_header("User-Agent", "webweave test");
    for (name, value) in headers {
        req = req.with_header(*name, *value);
    }
    if let Some(body) = body {
        if method == Method::POST && req.header("Content-Type").is_none() {
            req = req.with_header("Content-Type", "text/plain");
        }
        req = req.with_header("Content-Length", body.len().to_string());
        req = req.with_body(body.as_bytes().to_vec());
    }
    for (name, value) in cookies {
        req = req.with_cookie(name, value);
    }
    req
}

/// リクエストを送ってレスポンスを受け取る
pub fn get_response(
    server: &Server,
    method: Method,
    path: &str,
    body: Option<&str>,
    headers: &[(&str, &str)],
    cookies: &[(String, String)],
) -> Response {
    server.respond(build_request(method, path, body, headers, cookies))
}

/// 1ケースを検証する。Content-Lengthがあればボディ長との整合も確認する
pub fn check(server: &Server, test: &Test) {
    let resp = get_response(server, test.method, test.path, test.body, test.headers, &[]);
    assert_eq!(
        resp.status, test.expected_status,
        "{} {}: unexpected status (body: {:?})",
        test.method, test.path, resp.body_str()
    );
    assert_eq!(
        resp.body_str(),
        test.expected_body,
        "{} {}: unexpected body",
        test.method,
        test.path
    );
    if let Some(cl) = resp.header("Content-Length") {
        assert_eq!(
            cl.parse::<usize>().unwrap(),
            resp.body.len(),
            "{} {}: Content-Length does not match body",
            test.method,
            test.path
        );
    }
}

/// テーブルを順に検証する
pub fn check_all(server: &Server, tests: &[Test]) {
    for test in tests {
        check(server, test);
    }
}
