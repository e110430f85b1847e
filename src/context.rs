//! リクエストコンテキスト：ハンドラーに渡される全て

use std::any::Any;
use std::sync::Arc;

use serde::Serialize;

use crate::common::cookie::Cookie;
use crate::common::http::Request;
use crate::common::params::Params;
use crate::error::Error;
use crate::mimetype::mime_by_extension;
use crate::server::Server;
use crate::writer::{RawStream, ResponseWriter};

/// リクエストごとにディスパッチャーが構築し、ハンドラーへ渡されるコンテキスト
pub struct Context<'a> {
    /// このハンドラー呼び出しの元になったリクエスト
    pub request: Request,
    /// ハンドラーが書き込むレスポンスライター
    pub response: ResponseWriter,
    /// クエリ文字列とPOSTボディから集約されたパラメータ
    pub params: Params,
    /// サーバーへの参照
    pub server: &'a Server,
    /// WebSocketルートで乗っ取ったコネクション。それ以外ではNone
    pub websocket: Option<Box<dyn RawStream>>,
    /// ハンドラー起動前にServer::userから複製される共有状態
    pub user: Option<Arc<dyn Any + Send + Sync>>,
    /// 現在のXSRFトークン
    pub xsrf_token: String,
}

impl<'a> Context<'a> {
    /// ボディデータを書き込む
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        Ok(self.response.write(data)?)
    }

    /// 文字列をボディへ書き込む
    pub fn write_string(&mut self, content: &str) -> Result<usize, Error> {
        self.write(content.as_bytes())
    }

    /// 値をJSONとしてボディへ書き込む（Content-Typeも設定する）
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::ResponseSerialization(e.to_string()))?;
        self.response.set_header("Content-Type", "application/json");
        self.write(&body)?;
        Ok(())
    }

    /// ステータスと本文を書き出してレスポンスを打ち切る
    pub fn abort(&mut self, status: u16, body: &str) -> Result<(), Error> {
        self.response.write_header(status);
        self.write_string(body)?;
        Ok(())
    }

    /// リダイレクトレスポンスを返す
    pub fn redirect(&mut self, status: u16, url: &str) -> Result<(), Error> {
        self.response.set_header("Location", url);
        self.abort(status, &format!("Redirecting to: {}", url))
    }

    /// 304 Not Modified
    pub fn not_modified(&mut self) {
        self.response.write_header(304);
    }

    /// 404 Not Found
    pub fn not_found(&mut self, message: &str) -> Result<(), Error> {
        self.abort(404, message)
    }

    /// 406 Not Acceptable
    pub fn not_acceptable(&mut self, message: &str) -> Result<(), Error> {
        self.abort(406, message)
    }

    /// 401 Unauthorized
    pub fn unauthorized(&mut self, message: &str) -> Result<(), Error> {
        self.abort(401, message)
    }

    /// 拡張子からContent-Typeを設定する
    ///
    /// `/`を含む場合はそのまま設定する。設定した値を返し、
    /// 拡張子が未知の場合は何もせずNoneを返す。
    pub fn content_type(&mut self, ext: &str) -> Option<String> {
        let ctype = if ext.contains('/') {
            Some(ext.to_string())
        } else {
            mime_by_extension(ext.trim_start_matches('.')).map(str::to_string)
        };
        if let Some(ref c) = ctype {
            self.response.set_header("Content-Type", c);
        }
        ctype
    }

    /// ヘッダーを設定する。uniqueなら同名を置き換え、そうでなければ追加
    pub fn set_header(&mut self, name: &str, value: &str, unique: bool) {
        if unique {
            self.response.set_header(name, value);
        } else {
            self.response.add_header(name, value);
        }
    }

    /// クッキーをレスポンスへ追加
    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.response
            .add_header("Set-Cookie", &cookie.to_header_value());
    }

    /// リクエストからクッキー値を取得
    pub fn get_cookie(&self, name: &str) -> Option<String> {
        self.request.cookie(name)
    }

    /// クライアント側のクッキーを失効させる
    pub fn remove_cookie(&mut self, name: &str) {
        let cookie = Cookie::new(name, "").max_age(0);
        self.set_cookie(cookie);
    }

    /// Authorizationヘッダーからユーザー名とパスワードを取り出す
    pub fn get_basic_auth(&self) -> Result<(String, String), Error> {
        let header = self
            .request
            .header("Authorization")
            .ok_or_else(|| Error::Authentication("missing Authorization header".into()))?;
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or_else(|| Error::Authentication("not Basic authentication".into()))?;
        let decoded = base64::decode(encoded.trim())
            .map_err(|e| Error::Authentication(format!("invalid base64: {}", e)))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| Error::Authentication("credentials are not UTF-8".into()))?;
        match decoded.split_once(':') {
            Some((user, pass)) => Ok((user.to_string(), pass.to_string())),
            None => Err(Error::Authentication(
                "malformed credentials, expected user:password".into(),
            )),
        }
    }
}
