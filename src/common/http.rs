//! HTTP関連の基本型（メソッド、ヘッダー、リクエスト、レスポンス）

use std::fmt;

use serde::Deserialize;

use super::context::RequestContext;
use super::utils::is_header_value_valid;
use crate::error::Error;

/// HTTPメソッド
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::PUT => write!(f, "PUT"),
            Method::DELETE => write!(f, "DELETE"),
            Method::PATCH => write!(f, "PATCH"),
            Method::HEAD => write!(f, "HEAD"),
            Method::OPTIONS => write!(f, "OPTIONS"),
        }
    }
}

impl Method {
    /// 文字列からMethodに変換
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "PATCH" => Some(Method::PATCH),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            _ => None,
        }
    }
}

/// 挿入順を保持する大文字小文字非区別のヘッダーマップ
///
/// `Set-Cookie`のように同名ヘッダーを複数持てるようVecで保持する。
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// 新しい空のヘッダーマップを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名ヘッダーを全て置き換えて設定（無効な値はログに出してスキップ）
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if !is_header_value_valid(&value) {
            log::warn!("Headers::set skipped invalid value for {}: {:?}", name, value);
            return;
        }
        self.entries
            .retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value));
    }

    /// 同名ヘッダーを残したまま追加
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if !is_header_value_valid(&value) {
            log::warn!("Headers::add skipped invalid value for {}: {:?}", name, value);
            return;
        }
        self.entries.push((name, value));
    }

    /// 最初に一致したヘッダー値を取得
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 一致した全てのヘッダー値を取得
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// 一致するヘッダーを全て削除
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// ヘッダーが存在するか
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 全エントリを挿入順で走査
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// HTTPリクエスト
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTPメソッド
    pub method: Method,
    /// リクエストパス（クエリ文字列を除く）
    pub path: String,
    /// 生のクエリ文字列
    pub query: String,
    /// HTTPヘッダー
    pub headers: Headers,
    /// リクエストボディ
    pub body: Option<Vec<u8>>,
    /// ラッパー間でのデータ共有に使うリクエストコンテキスト
    context: RequestContext,
}

impl Request {
    /// 新しいリクエストを作成。pathに`?`が含まれる場合はクエリ文字列として分離する
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let raw = path.into();
        let (path, query) = match raw.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (raw, String::new()),
        };
        Self {
            method,
            path,
            query,
            headers: Headers::new(),
            body: None,
            context: RequestContext::new(),
        }
    }

    /// ヘッダーを追加
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// ボディを追加
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// クッキーを追加（既存のCookieヘッダーへ連結）
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        let pair = format!("{}={}", name, value);
        let merged = match self.headers.get("Cookie") {
            Some(existing) => format!("{}; {}", existing, pair),
            None => pair,
        };
        self.headers.set("Cookie", merged);
        self
    }

    /// 最初に一致したヘッダー値を取得
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Cookieヘッダーを(name, value)のリストに展開
    pub fn cookies(&self) -> Vec<(String, String)> {
        let mut cookies = Vec::new();
        for line in self.headers.get_all("Cookie") {
            for pair in line.split(';') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((n, v)) => cookies.push((n.to_string(), v.to_string())),
                    None => cookies.push((pair.to_string(), String::new())),
                }
            }
        }
        cookies
    }

    /// 名前が一致した最初のクッキー値を取得
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// ボディをJSONとしてパース
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, Error> {
        match &self.body {
            Some(body) => serde_json::from_slice(body)
                .map_err(|e| Error::web(400, format!("Invalid request body: {}", e))),
            None => Err(Error::web(400, "Invalid request body: no request body")),
        }
    }

    /// リクエストコンテキストの不変参照を取得
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// リクエストコンテキストの可変参照を取得
    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }
}

/// バッファリングされたHTTPレスポンス
///
/// `Server::respond`が返す形。トランスポートはこれをワイヤへ直列化する。
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTPステータスコード
    pub status: u16,
    /// HTTPヘッダー
    pub headers: Headers,
    /// レスポンスボディ
    pub body: Vec<u8>,
}

impl Response {
    /// 新しいレスポンスを作成
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// 最初に一致したヘッダー値を取得
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// ボディをUTF-8文字列として取得
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Set-Cookieヘッダーを(name, value)のリストに展開（属性部は捨てる）
    pub fn set_cookies(&self) -> Vec<(String, String)> {
        let mut cookies = Vec::new();
        for line in self.headers.get_all("Set-Cookie") {
            let cookie = line.split(';').next().unwrap_or("");
            if let Some((n, v)) = cookie.split_once('=') {
                cookies.push((n.trim().to_string(), v.trim().to_string()));
            }
        }
        cookies
    }
}

/// ステータスコードの理由句を取得（未知のコードは空文字列）
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
