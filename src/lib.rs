//! webweave: 正規表現ルーティングと柔軟なハンドラーシグネチャを持つ軽量Webフレームワーク
//!
//! 中心にあるのはリクエストハンドラー。引数なしで文字列を返すだけの関数から、
//! [`Context`]とパスのキャプチャを受け取る関数まで、複数の形をそのまま登録できる。
//!
//! ```no_run
//! use webweave::Server;
//!
//! fn hello(name: String) -> String {
//!     format!("hello, {}", name)
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut server = Server::new();
//!     server.get("/(.*)", hello);
//!     server.run("127.0.0.1:9999").await.unwrap();
//! }
//! ```
//!
//! ルーティングテーブルは正規表現ベースで、キャプチャグループが
//! ハンドラーの引数として渡される。ラッパー（ミドルウェア）・
//! セキュアクッキー・XSRF・アクセスログを備える。
//!
//! 単一プロセスに1つでよい場合はモジュールレベルの[`get`]や[`run`]が
//! 共有サーバーへ転送する。テストでは[`Server`]を個別に作ること。

pub mod common;
pub mod compress;
pub mod context;
pub mod error;
pub mod flash;
pub mod handler;
pub mod logger;
pub mod mimetype;
pub mod run;
pub mod secure_cookie;
pub mod server;
pub mod servefile;
pub mod session;
pub mod writer;
pub mod xsrf;

pub use common::{reason_phrase, Cookie, Headers, Method, Params, Request, RequestContext,
                 Response, SameSite};
pub use compress::compress_wrapper;
pub use context::Context;
pub use error::Error;
pub use flash::Flash;
pub use handler::{
    AdaptedHandler, BodyReader, HttpHandler, IntoHandler, Json, Respond, SimpleHandler,
    WriteBody, Wrapper,
};
pub use logger::AccessLog;
pub use mimetype::guess_mimetype_wrapper;
pub use run::{BufferSink, ShutdownHandle};
pub use server::{Server, ServerConfig};
pub use session::{MemorySessionStore, SessionStore};
pub use writer::{BodyWriter, RawStream, ResponseSink, ResponseWriter};

use std::sync::{Mutex, OnceLock};

// --- 共有サーバーへのモジュールレベルのファサード ---------------------------

struct MainState {
    server: Option<Server>,
    shutdown: Option<ShutdownHandle>,
}

static MAIN_SERVER: OnceLock<Mutex<MainState>> = OnceLock::new();

fn main_state() -> &'static Mutex<MainState> {
    MAIN_SERVER.get_or_init(|| {
        Mutex::new(MainState {
            server: Some(Server::new()),
            shutdown: None,
        })
    })
}

fn with_main<R>(f: impl FnOnce(&mut Server) -> R) -> R {
    let mut state = main_state().lock().expect("shared server poisoned");
    let server = state.server.get_or_insert_with(Server::new);
    f(server)
}

/// 共有サーバーへGETルートを登録する
pub fn get<H, T>(pattern: &str, handler: H)
where
    H: IntoHandler<T>,
{
    with_main(|s| s.get(pattern, handler));
}

/// 共有サーバーへPOSTルートを登録する
pub fn post<H, T>(pattern: &str, handler: H)
where
    H: IntoHandler<T>,
{
    with_main(|s| s.post(pattern, handler));
}

/// 共有サーバーへPUTルートを登録する
pub fn put<H, T>(pattern: &str, handler: H)
where
    H: IntoHandler<T>,
{
    with_main(|s| s.put(pattern, handler));
}

/// 共有サーバーへDELETEルートを登録する
pub fn delete<H, T>(pattern: &str, handler: H)
where
    H: IntoHandler<T>,
{
    with_main(|s| s.delete(pattern, handler));
}

/// 共有サーバーへ任意メソッドのルートを登録する
pub fn match_method<H, T>(method: Method, pattern: &str, handler: H)
where
    H: IntoHandler<T>,
{
    with_main(|s| s.match_method(method, pattern, handler));
}

/// 共有サーバーへ生のHTTPハンドラーを登録する
pub fn handle(pattern: &str, method: Method, handler: impl HttpHandler + 'static) {
    with_main(|s| s.handle(pattern, method, handler));
}

/// 共有サーバーへWebSocketルートを登録する
pub fn websocket<H, T>(pattern: &str, handler: H)
where
    H: IntoHandler<T>,
{
    with_main(|s| s.websocket(pattern, handler));
}

/// 共有サーバーへラッパーを登録する
pub fn add_wrapper(
    wrapper: impl Fn(&SimpleHandler, &mut Context) -> Result<(), Error> + Send + Sync + 'static,
) {
    with_main(|s| s.add_wrapper(wrapper));
}

/// 共有サーバーへ前処理モジュールを登録する（互換エイリアス）
pub fn add_pre_module(
    f: impl Fn(&mut Context) -> Result<(), Error> + Send + Sync + 'static,
) {
    with_main(|s| s.add_pre_module(f));
}

/// 共有サーバーの設定などを変更する
pub fn configure(f: impl FnOnce(&mut Server)) {
    with_main(f);
}

/// 共有サーバーでHTTPリクエストの受け付けを開始する
pub async fn run(addr: &str) -> Result<(), Error> {
    let server = {
        let mut state = main_state().lock().expect("shared server poisoned");
        let server = state.server.take().unwrap_or_else(Server::new);
        state.shutdown = Some(server.shutdown_handle());
        server
    };
    server.run(addr).await
}

/// 共有サーバーを停止する
pub fn close() {
    let state = main_state().lock().expect("shared server poisoned");
    match &state.shutdown {
        Some(handle) => handle.shutdown(),
        None => log::warn!("closing non-listening webweave server"),
    }
}
