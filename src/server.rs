//! ルートテーブルとディスパッチャー
//!
//! リクエストが来たら何が起きるか：ルーティングが担当ハンドラーを決め、
//! それを適切にラップして呼び出す。

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::panic;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use tokio::sync::Notify;

use crate::common::http::{Method, Request, Response};
use crate::common::params::Params;
use crate::common::utils::{http_date, parse_query_string};
use crate::context::Context;
use crate::error::Error;
use crate::handler::adapter::{AdaptedHandler, HttpHandler, IntoHandler};
use crate::handler::wrapper::{bind_captures, wrap_handler, SimpleHandler, Wrapper};
use crate::logger::{default_access_logger, AccessLog, AccessLoggerFactory};
use crate::run::BufferSink;
use crate::secure_cookie::{derive_keys, SecureKeys};
use crate::servefile::serve_file;
use crate::session::SessionStore;
use crate::writer::{ResponseWriter, SharedSink};
use crate::xsrf::{UidExtractor, XsrfConfig};

/// Serverヘッダーに使う識別子
const SERVER_NAME: &str = "webweave";

/// サーバーの設定
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 静的ファイルのルートディレクトリ。未設定なら実行ファイル隣のstatic/
    pub static_dir: Option<PathBuf>,
    /// セキュアクッキーの共有シークレット
    pub cookie_secret: String,
    /// ハンドラーのパニックを捕捉して500を返すか
    pub recover_panic: bool,
    /// /debug/以下に内部状態の確認用ルートを公開するか
    pub profiler: bool,
    /// アクセスログをANSIカラーで出力するか
    pub color_output: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            static_dir: None,
            cookie_secret: String::new(),
            recover_panic: true,
            profiler: false,
            color_output: true,
        }
    }
}

/// 登録済みルートのターゲット
enum RouteTarget {
    /// アダプター済みハンドラー
    Adapted(AdaptedHandler),
    /// 生のHTTPハンドラー
    Raw(Arc<dyn HttpHandler>),
}

/// 登録後は不変のルート
struct Route {
    method: Method,
    pattern: String,
    rex: Regex,
    websocket: bool,
    target: RouteTarget,
}

/// 登録面とリクエストの受け口を兼ねるサーバー本体
///
/// ルート・ラッパー・設定はいずれかのrunメソッド呼び出し以降は読み取り専用。
pub struct Server {
    /// サーバー設定
    pub config: ServerConfig,
    /// 全ハンドラーへ複製されるアプリケーション共有状態
    pub user: Option<Arc<dyn Any + Send + Sync>>,
    /// XSRF設定
    pub xsrf: XsrfConfig,
    routes: Vec<Route>,
    wrappers: Vec<Wrapper>,
    access_logger: AccessLoggerFactory,
    session_store: Option<Arc<dyn SessionStore>>,
    keys: OnceLock<SecureKeys>,
    pub(crate) shutdown: Arc<Notify>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// パターンを両端アンカー付きに整える
fn ensure_anchored(pattern: &str) -> Result<String, Error> {
    if pattern.is_empty() {
        return Err(Error::web(500, "empty route pattern is not allowed"));
    }
    if pattern.starts_with('^') && pattern.ends_with('$') {
        return Ok(pattern.to_string());
    }
    let anchored = format!(
        "^{}$",
        pattern.trim_start_matches('^').trim_end_matches('$')
    );
    log::debug!(
        "pattern {:?} lacks anchors, compiled as {:?}",
        pattern,
        anchored
    );
    Ok(anchored)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

type SharedAccessLog = Rc<RefCell<Box<dyn AccessLog>>>;

impl Server {
    /// 新しいサーバーを作成
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            user: None,
            xsrf: XsrfConfig::default(),
            routes: Vec::new(),
            wrappers: Vec::new(),
            access_logger: Arc::new(default_access_logger),
            session_store: None,
            keys: OnceLock::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// GETルートを登録（HEADはGETハンドラーで処理される）
    pub fn get<H, T>(&mut self, pattern: &str, handler: H)
    where
        H: IntoHandler<T>,
    {
        self.match_method(Method::GET, pattern, handler);
    }

    /// POSTルートを登録
    pub fn post<H, T>(&mut self, pattern: &str, handler: H)
    where
        H: IntoHandler<T>,
    {
        self.match_method(Method::POST, pattern, handler);
    }

    /// PUTルートを登録
    pub fn put<H, T>(&mut self, pattern: &str, handler: H)
    where
        H: IntoHandler<T>,
    {
        self.match_method(Method::PUT, pattern, handler);
    }

    /// DELETEルートを登録
    pub fn delete<H, T>(&mut self, pattern: &str, handler: H)
    where
        H: IntoHandler<T>,
    {
        self.match_method(Method::DELETE, pattern, handler);
    }

    /// 任意のメソッドでルートを登録
    pub fn match_method<H, T>(&mut self, method: Method, pattern: &str, handler: H)
    where
        H: IntoHandler<T>,
    {
        self.add_route(
            method,
            pattern,
            Some(H::ARITY),
            false,
            RouteTarget::Adapted(handler.into_handler()),
        );
    }

    /// 生のHTTPハンドラーを登録
    pub fn handle(&mut self, pattern: &str, method: Method, handler: impl HttpHandler + 'static) {
        self.add_route(
            method,
            pattern,
            None,
            false,
            RouteTarget::Raw(Arc::new(handler)),
        );
    }

    /// WebSocketルートを登録
    ///
    /// Upgrade: websocketヘッダー付きのリクエストだけがマッチし、
    /// ハンドラー呼び出し前にコネクションの乗っ取りを試みてContextへ渡す。
    pub fn websocket<H, T>(&mut self, pattern: &str, handler: H)
    where
        H: IntoHandler<T>,
    {
        self.add_route(
            Method::GET,
            pattern,
            Some(H::ARITY),
            true,
            RouteTarget::Adapted(handler.into_handler()),
        );
    }

    fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        arity: Option<usize>,
        websocket: bool,
        target: RouteTarget,
    ) {
        let anchored = match ensure_anchored(pattern) {
            Ok(p) => p,
            Err(e) => {
                log::error!("Error in route pattern {:?}: {}", pattern, e);
                return;
            }
        };
        let rex = match Regex::new(&anchored) {
            Ok(r) => r,
            Err(e) => {
                log::error!(
                    "{}",
                    Error::InvalidPattern {
                        pattern: pattern.to_string(),
                        source: e,
                    }
                );
                return;
            }
        };
        let groups = rex.captures_len() - 1;
        if let Some(expected) = arity {
            // ルートのキャプチャ数とハンドラーの引数の数は登録時に照合する
            if groups != expected {
                log::error!(
                    "Route {:?} has {} capture groups but the handler takes {}; route rejected",
                    pattern,
                    groups,
                    expected
                );
                return;
            }
        }
        log::debug!("Registering handler for {} with pattern: {}", method, anchored);
        self.routes.push(Route {
            method,
            pattern: anchored,
            rex,
            websocket,
            target,
        });
    }

    /// 全リクエストを包むラッパーを登録する。既存の登録より内側に積まれる
    pub fn add_wrapper(
        &mut self,
        wrapper: impl Fn(&SimpleHandler, &mut Context) -> Result<(), Error> + Send + Sync + 'static,
    ) {
        self.wrappers.push(Arc::new(wrapper));
    }

    /// 互換エイリアス：内側ハンドラーの前にfを呼ぶラッパーを登録する
    pub fn add_pre_module(
        &mut self,
        f: impl Fn(&mut Context) -> Result<(), Error> + Send + Sync + 'static,
    ) {
        self.add_wrapper(move |h, ctx| {
            f(ctx)?;
            h(ctx)
        });
    }

    /// アクセスロガーのファクトリを差し替える
    pub fn set_access_logger(
        &mut self,
        factory: impl Fn(&Server) -> Box<dyn AccessLog> + Send + Sync + 'static,
    ) {
        self.access_logger = Arc::new(factory);
    }

    /// セッションストレージを設定する
    pub fn set_session_store(&mut self, store: Arc<dyn SessionStore>) {
        self.session_store = Some(store);
    }

    /// 設定済みのセッションストレージを取得する
    pub fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        self.session_store.clone()
    }

    /// XSRFのシークレットとユーザーID抽出関数を設定する
    pub fn set_xsrf(&mut self, secret: impl Into<String>, get_uid: UidExtractor) {
        self.xsrf = XsrfConfig {
            secret: secret.into(),
            get_uid: Some(get_uid),
        };
    }

    /// 導出済みのクッキー鍵を取得する（初回アクセス時に導出）
    pub(crate) fn secure_keys(&self) -> &SecureKeys {
        self.keys
            .get_or_init(|| derive_keys(&self.config.cookie_secret))
    }

    /// profiler設定用の内部状態確認ルートを登録する
    pub(crate) fn mount_debug_routes(&mut self) {
        let mut listing = String::new();
        for route in &self.routes {
            let _ = writeln!(listing, "{} {}", route.method, route.pattern);
        }
        self.get("/debug/routes", move || listing.clone());
    }

    /// メソッドとパスが一致する最初のルートとキャプチャを返す
    fn find_matching_route<'s>(&'s self, req: &Request) -> Option<(&'s Route, Vec<String>)> {
        self.routes
            .iter()
            .find_map(|route| match_route(req, route).map(|caps| (route, caps)))
    }

    /// リクエストに対応するハンドラーを決める
    fn route_request(&self, ctx: &mut Context) -> SimpleHandler {
        let get_like = matches!(ctx.request.method, Method::GET | Method::HEAD);

        // 静的ファイルが見つかればハンドラーより優先する
        if get_like {
            if let Some(path) = self.find_static_file(&ctx.request.path) {
                return Box::new(move |ctx: &mut Context| serve_file(ctx, &path));
            }
        }

        if let Some((route, captures)) = self.find_matching_route(&ctx.request) {
            match &route.target {
                RouteTarget::Adapted(handler) if route.websocket => {
                    let handler = handler.clone();
                    return Box::new(move |ctx: &mut Context| {
                        ctx.websocket = ctx.response.hijack();
                        handler(ctx, &captures)
                    });
                }
                RouteTarget::Adapted(handler) => {
                    // ハンドラーが上書きできる既定のContent-Type
                    ctx.response
                        .set_default_content_type("text/html; charset=utf-8");
                    return bind_captures(handler.clone(), captures);
                }
                RouteTarget::Raw(handler) => {
                    let handler = handler.clone();
                    return Box::new(move |ctx: &mut Context| {
                        handler.serve_http(&mut ctx.response, &ctx.request);
                        Ok(())
                    });
                }
            }
        }

        // ルートが無ければディレクトリのインデックスファイルを試す
        if get_like {
            if let Some(path) = self.find_index_file(&ctx.request.path) {
                return Box::new(move |ctx: &mut Context| serve_file(ctx, &path));
            }
        }

        Box::new(|_ctx: &mut Context| Err(Error::web(404, "Page not found")))
    }

    /// ハンドラーを呼び出し、エラーとパニックを可能な限り処理する
    fn apply_handler(&self, handler: SimpleHandler, ctx: &mut Context, logger: &SharedAccessLog) {
        let outcome = if self.config.recover_panic {
            panic::catch_unwind(panic::AssertUnwindSafe(|| handler(ctx)))
        } else {
            Ok(handler(ctx))
        };
        let soft_err = match outcome {
            Err(payload) => {
                log::error!("Handler crashed with error: {}", panic_message(&*payload));
                log::error!("{}", std::backtrace::Backtrace::force_capture());
                if let Err(e) = ctx.abort(500, "Server Error") {
                    log::warn!("failed to write error response: {}", e);
                }
                Some(Error::web(500, "Server Error"))
            }
            Ok(Err(err)) => {
                match &err {
                    Error::Web { status, message } => {
                        let (status, message) = (*status, message.clone());
                        if let Err(e) = ctx.abort(status, &message) {
                            log::warn!("failed to write error response: {}", e);
                        }
                    }
                    other => {
                        // Web以外のエラーの中身はクライアントへ漏らさない
                        log::error!("Handler returned error: {}", other);
                        if let Err(e) = ctx.abort(500, "Server Error") {
                            log::warn!("failed to write error response: {}", e);
                        }
                    }
                }
                Some(err)
            }
            Ok(Ok(())) => {
                // 一度も書き込まれなくてもフックは発火させる
                if let Err(e) = ctx.response.write(&[]) {
                    log::warn!("failed to flush response: {}", e);
                }
                None
            }
        };
        if let Err(e) = ctx.response.close() {
            log::warn!("error closing response body: {}", e);
        }
        logger.borrow_mut().log_done(soft_err.as_ref());
    }

    /// リクエストを処理してシンクへレスポンスを流す
    pub fn dispatch(&self, request: Request, sink: SharedSink) {
        let head_only = request.method == Method::HEAD;
        let logger: SharedAccessLog = Rc::new(RefCell::new((self.access_logger)(self)));
        logger.borrow_mut().log_request(&request);

        let mut response = ResponseWriter::new(sink, head_only);
        response.set_header("Server", SERVER_NAME);
        response.set_header("Date", &http_date(Utc::now()));
        {
            let logger = logger.clone();
            response.set_head_observer(move |status, headers| {
                logger.borrow_mut().log_header(status, headers)
            });
        }

        // クエリとフォームボディのパラメータ。パースエラーは無視する
        let mut params = Params::new();
        for (key, value) in parse_query_string(&request.query) {
            params.insert(key, value);
        }
        if matches!(request.method, Method::POST | Method::PUT | Method::PATCH) {
            let form_body = request
                .header("Content-Type")
                .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
                .unwrap_or(false);
            if form_body {
                if let Some(body) = &request.body {
                    let text = String::from_utf8_lossy(body);
                    for (key, value) in parse_query_string(&text) {
                        params.insert(key, value);
                    }
                }
            }
        }
        if !params.is_empty() {
            logger.borrow_mut().log_params(&params);
        }

        let mut ctx = Context {
            request,
            response,
            params,
            server: self,
            websocket: None,
            user: self.user.clone(),
            xsrf_token: String::new(),
        };

        let mut handler = self.route_request(&mut ctx);
        // ラッパーの合成。最初に登録されたものが最外側になる
        for wrapper in self.wrappers.iter().rev() {
            handler = wrap_handler(wrapper.clone(), handler);
        }
        self.apply_handler(handler, &mut ctx, &logger);
    }

    /// リクエストを処理してバッファ済みのレスポンスを返す
    ///
    /// テストと、外部トランスポート（CGI系など）の組み込み点。
    pub fn respond(&self, request: Request) -> Response {
        let sink = Rc::new(RefCell::new(BufferSink::new()));
        let shared: SharedSink = sink.clone();
        self.dispatch(request, shared);
        let response = sink.borrow_mut().take_response();
        response
    }
}

/// メソッド・WebSocket条件・アンカー付き正規表現でルートを照合する
///
/// HEADリクエストはGETルートでも処理される。
fn match_route(req: &Request, route: &Route) -> Option<Vec<String>> {
    if route.websocket {
        let upgrading = req
            .header("Upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        if !upgrading {
            return None;
        }
    } else if req.method != route.method
        && !(req.method == Method::HEAD && route.method == Method::GET)
    {
        return None;
    }
    let captures = route.rex.captures(&req.path)?;
    // 全体一致のみ受け付ける
    if captures.get(0).map(|m| m.as_str().len()) != Some(req.path.len()) {
        return None;
    }
    Some(
        (1..captures.len())
            .map(|i| {
                captures
                    .get(i)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            })
            .collect(),
    )
}
