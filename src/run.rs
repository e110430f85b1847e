//! バンドルのHTTP/1.1トランスポートとサーバー起動

use std::io;
use std::mem;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::common::http::{reason_phrase, Headers, Method, Request, Response};
use crate::error::Error;
use crate::server::Server;
use crate::writer::ResponseSink;

/// リクエストヘッドの上限サイズ
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// リクエストボディの最大サイズ（バイト）を取得する
/// 優先順位: 環境変数 `WEBWEAVE_MAX_BODY_SIZE` -> デフォルト 5MB
fn max_body_size() -> usize {
    const DEFAULT_MAX_SIZE: usize = 5 * 1024 * 1024;
    std::env::var("WEBWEAVE_MAX_BODY_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_SIZE)
}

/// レスポンスをメモリへ蓄積するシンク
///
/// バンドルのトランスポートとテスト・組み込み用途（CGI系）が使う。
#[derive(Debug)]
pub struct BufferSink {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// 蓄積した内容をResponseとして取り出す
    pub fn take_response(&mut self) -> Response {
        Response {
            status: self.status,
            headers: mem::take(&mut self.headers),
            body: mem::take(&mut self.body),
        }
    }
}

impl Default for BufferSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for BufferSink {
    fn write_head(&mut self, status: u16, headers: &Headers) -> io::Result<()> {
        self.status = status;
        self.headers = headers.clone();
        Ok(())
    }

    fn write_body(&mut self, data: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }
}

/// 稼働中のサーバーを外から停止するためのハンドル
#[derive(Clone)]
pub struct ShutdownHandle(Arc<tokio::sync::Notify>);

impl ShutdownHandle {
    /// acceptループを停止させる
    pub fn shutdown(&self) {
        self.0.notify_one();
    }
}

impl Server {
    /// 起動前の初期化。鍵導出とデバッグルートの登録
    fn prepare(&mut self) {
        let _ = self.secure_keys();
        if self.config.profiler {
            self.mount_debug_routes();
        }
    }

    /// runの前に取得しておくと、別タスクからサーバーを停止できる
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// HTTPリクエストの受け付けを開始する
    ///
    /// コネクションごとにタスクを起こし、ハンドラー本体はブロッキング
    /// スレッドで実行する。`shutdown_handle`からの通知で抜ける。
    pub async fn run(mut self, addr: &str) -> Result<(), Error> {
        let _ = env_logger::try_init();
        self.prepare();
        let listener = TcpListener::bind(addr).await?;
        log::info!("webweave serving {}", addr);
        let shutdown = self.shutdown.clone();
        let server = Arc::new(self);
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    log::info!("webweave shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    log::debug!("connection from {}", peer);
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(server, stream).await {
                            log::debug!("connection error: {}", e);
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(server: Arc<Server>, mut stream: TcpStream) -> Result<(), Error> {
    let request = match read_request(&mut stream).await {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(Error::Web { status, message }) => {
            // リクエストが組み立てられなかった場合はここで応答を返す
            let mut response = Response::new(status);
            response.body = message.into_bytes();
            return write_response(&mut stream, &response, false).await;
        }
        Err(e) => return Err(e),
    };
    let head_only = request.method == Method::HEAD;
    let response = tokio::task::spawn_blocking(move || server.respond(request))
        .await
        .unwrap_or_else(|e| {
            log::error!("handler task failed: {}", e);
            let mut response = Response::new(500);
            response.body = b"Server Error".to_vec();
            response
        });
    write_response(&mut stream, &response, head_only).await
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// ストリームからリクエストを1つ読み取る。接続が先に閉じたらNone
async fn read_request(stream: &mut TcpStream) -> Result<Option<Request>, Error> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_HEAD_SIZE {
            return Err(Error::web(431, "Request Header Fields Too Large"));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .and_then(Method::parse)
        .ok_or_else(|| Error::web(400, "Bad Request"))?;
    let target = parts.next().ok_or_else(|| Error::web(400, "Bad Request"))?;

    let mut request = Request::new(method, target);
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            request.headers.add(name.trim(), value.trim());
        }
    }

    let content_length = request
        .header("Content-Length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > max_body_size() {
        return Err(Error::web(413, "Payload Too Large"));
    }
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    if content_length > 0 {
        request.body = Some(body);
    }
    Ok(Some(request))
}

/// バッファ済みレスポンスをワイヤへ直列化する
async fn write_response(
    stream: &mut TcpStream,
    response: &Response,
    head_only: bool,
) -> Result<(), Error> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason_phrase(response.status)
    );
    for (name, value) in response.headers.iter() {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    if !response.headers.contains("Content-Length") && !head_only {
        head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    }
    head.push_str("Connection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    if !head_only {
        stream.write_all(&response.body).await?;
    }
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_roundtrip() {
        let mut sink = BufferSink::new();
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/plain");
        sink.write_head(201, &headers).unwrap();
        sink.write_body(b"created").unwrap();

        let response = sink.take_response();
        assert_eq!(response.status, 201);
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.body_str(), "created");
    }

    #[test]
    fn test_find_subsequence() {
        assert_eq!(find_subsequence(b"abc\r\n\r\ndef", b"\r\n\r\n"), Some(3));
        assert_eq!(find_subsequence(b"abc", b"\r\n\r\n"), None);
    }
}
