//! エラー型の定義

use thiserror::Error;

/// フレームワークのエラー型
#[derive(Error, Debug)]
pub enum Error {
    /// ハンドラーが明示的に返すHTTPエラー（ステータスとメッセージをそのままクライアントへ返す）
    #[error("{message}")]
    Web { status: u16, message: String },

    /// セキュアクッキーの秘密鍵が未設定
    #[error("Secret Key for secure cookies has not been set. Assign one to ServerConfig.cookie_secret.")]
    MissingCookieSecret,

    /// セキュアクッキーの派生鍵が未初期化
    #[error("The keys for secure cookies have not been initialized. Ensure that a run method is being called")]
    InvalidKey,

    /// ハンドラー戻り値をボディへ書き出せない
    #[error("cannot serialize data for writing to client")]
    Unserializable,

    /// ルートパターンの正規表現エラー
    #[error("Invalid route pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// レスポンスのシリアライズエラー
    #[error("Failed to serialize response: {0}")]
    ResponseSerialization(String),

    /// 認証ヘッダーの解析エラー
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// ステータスコード付きのエラーを作成
    pub fn web(status: u16, message: impl Into<String>) -> Self {
        Error::Web {
            status,
            message: message.into(),
        }
    }

    /// エラーからHTTPステータスコードを取得
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Web { status, .. } => *status,
            Error::Authentication(_) => 401,
            Error::MissingCookieSecret
            | Error::InvalidKey
            | Error::Unserializable
            | Error::InvalidPattern { .. }
            | Error::ResponseSerialization(_)
            | Error::Io(_) => 500,
        }
    }
}
