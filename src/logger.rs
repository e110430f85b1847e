//! アクセスログ

use std::sync::Arc;

use crate::common::http::{Headers, Request};
use crate::common::params::Params;
use crate::error::Error;
use crate::server::Server;

/// 1リクエスト分のアクセスロガー
///
/// メソッドは以下の順で一度ずつ呼ばれる:
/// `log_request` → `log_params`（パラメータがある場合のみ）→
/// `log_header`（ヘッダー送出直前）→ `log_done`（レスポンス完了後）。
/// 引数は参照渡しだが変更してはならない。
pub trait AccessLog {
    /// 受信したリクエスト
    fn log_request(&mut self, req: &Request);
    /// 解析済みパラメータ
    fn log_params(&mut self, params: &Params);
    /// 確定したステータスとヘッダー
    fn log_header(&mut self, status: u16, headers: &Headers);
    /// レスポンス完了。処理中にエラーがあればそれが渡される
    fn log_done(&mut self, err: Option<&Error>);
}

/// リクエストごとにロガーを生成するファクトリ
pub type AccessLoggerFactory = Arc<dyn Fn(&Server) -> Box<dyn AccessLog> + Send + Sync>;

/// logクレートへ出力する素朴なロガー
struct PlainAccessLog;

impl AccessLog for PlainAccessLog {
    fn log_request(&mut self, req: &Request) {
        log::info!("{} {}", req.method, req.path);
    }

    fn log_params(&mut self, params: &Params) {
        log::info!("Params: {:?}", params);
    }

    fn log_header(&mut self, _status: u16, _headers: &Headers) {}

    fn log_done(&mut self, _err: Option<&Error>) {}
}

/// ANSIカラー付きのロガー
struct ColoredAccessLog;

impl AccessLog for ColoredAccessLog {
    fn log_request(&mut self, req: &Request) {
        log::info!("\x1b[32;1m{} {}\x1b[0m", req.method, req.path);
    }

    fn log_params(&mut self, params: &Params) {
        log::info!("\x1b[37;1mParams: {:?}\x1b[0m", params);
    }

    fn log_header(&mut self, _status: u16, _headers: &Headers) {}

    fn log_done(&mut self, _err: Option<&Error>) {}
}

/// 既定のアクセスロガーファクトリ。ColorOutput設定で色付きを選ぶ
pub fn default_access_logger(server: &Server) -> Box<dyn AccessLog> {
    if server.config.color_output {
        Box::new(ColoredAccessLog)
    } else {
        Box::new(PlainAccessLog)
    }
}
