//! XSRFトークンの発行と検証
//!
//! トークンはセキュアクッキー`_xsrf`で往復し、フォームの`_xsrf`フィールドで
//! 送り返される。形式は `base64url(HMAC(secret, "uid:action:millis")):millis`。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::context::Context;
use crate::error::Error;
use crate::handler::wrapper::SimpleHandler;

type HmacSha256 = Hmac<Sha256>;

/// トークンの有効期間（秒）
pub const TOKEN_TIMEOUT_SECS: i64 = 24 * 60 * 60;

/// クッキー名とフォームフィールド名
pub const XSRF_FIELD: &str = "_xsrf";

/// 現在のユーザーIDをContextから取り出す関数
pub type UidExtractor = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// サーバーに設定するXSRF関連の設定
#[derive(Clone, Default)]
pub struct XsrfConfig {
    /// トークン署名用のシークレット
    pub secret: String,
    /// ユーザーID抽出関数。未設定ならトークンは発行されない
    pub get_uid: Option<UidExtractor>,
}

fn mac_for(secret: &str, uid: &str, action: &str, millis: i64) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{}:{}:{}", uid, action, millis).as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

/// 指定時刻のトークンを生成する
pub fn generate(secret: &str, uid: &str, action: &str, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    let mac = mac_for(secret, uid, action, millis).unwrap_or_default();
    format!(
        "{}:{}",
        base64::encode_config(mac, base64::URL_SAFE_NO_PAD),
        millis
    )
}

/// トークンを検証する。発行時刻が未来または期限切れなら失敗
pub fn validate_token(
    secret: &str,
    token: &str,
    uid: &str,
    action: &str,
    now: DateTime<Utc>,
) -> bool {
    let Some((mac_b64, millis_str)) = token.rsplit_once(':') else {
        return false;
    };
    let Ok(millis) = millis_str.parse::<i64>() else {
        return false;
    };
    let issued = millis / 1000;
    let age = now.timestamp() - issued;
    if !(0..=TOKEN_TIMEOUT_SECS).contains(&age) {
        return false;
    }
    let Ok(sent_mac) = base64::decode_config(mac_b64, base64::URL_SAFE_NO_PAD) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}:{}:{}", uid, action, millis).as_bytes());
    mac.verify_slice(&sent_mac).is_ok()
}

/// リクエストのトークンを準備してContextへ載せる
///
/// セキュアクッキーに既存のトークンがあればそれを使い、なければ設定済みの
/// 抽出関数でユーザーIDを引いて新しいトークンを発行・保存する。
pub fn prepare(ctx: &mut Context) {
    if let Some(token) = ctx.get_secure_cookie(XSRF_FIELD) {
        if !token.is_empty() {
            ctx.xsrf_token = token;
            return;
        }
    }
    let Some(get_uid) = ctx.server.xsrf.get_uid.clone() else {
        return;
    };
    let uid = get_uid(ctx);
    if uid.is_empty() {
        return;
    }
    let token = generate(&ctx.server.xsrf.secret, &uid, "POST", Utc::now());
    if let Err(e) = ctx.set_secure_cookie(XSRF_FIELD, &token, TOKEN_TIMEOUT_SECS) {
        log::warn!("failed to store xsrf cookie: {}", e);
        return;
    }
    ctx.xsrf_token = token;
}

/// 内側ハンドラーの前にトークンを準備するラッパー
pub fn xsrf_wrapper(h: &SimpleHandler, ctx: &mut Context) -> Result<(), Error> {
    prepare(ctx);
    h(ctx)
}

/// フォームに埋め込むhidden inputフィールドを生成する
pub fn form_field(ctx: &Context) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
        XSRF_FIELD, ctx.xsrf_token
    )
}

/// フォーム値とContextのトークンの一致を検証する
///
/// トークンが空の場合は常に失敗。
pub fn validate(ctx: &Context) -> bool {
    if ctx.xsrf_token.is_empty() {
        return false;
    }
    ctx.params.get(XSRF_FIELD) == Some(ctx.xsrf_token.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_generate_validate_roundtrip() {
        let now = Utc::now();
        let token = generate("secret", "user1", "POST", now);
        assert!(validate_token("secret", &token, "user1", "POST", now));
    }

    #[test]
    fn test_validate_rejects_wrong_inputs() {
        let now = Utc::now();
        let token = generate("secret", "user1", "POST", now);
        // ユーザー・アクション・シークレットのいずれが違っても失敗
        assert!(!validate_token("secret", &token, "user2", "POST", now));
        assert!(!validate_token("secret", &token, "user1", "DELETE", now));
        assert!(!validate_token("other", &token, "user1", "POST", now));
    }

    #[test]
    fn test_validate_rejects_expired_and_future() {
        let now = Utc::now();
        let token = generate("secret", "user1", "POST", now);
        let expired = now + Duration::seconds(TOKEN_TIMEOUT_SECS + 1);
        assert!(!validate_token("secret", &token, "user1", "POST", expired));
        let before_issue = now - Duration::seconds(10);
        assert!(!validate_token("secret", &token, "user1", "POST", before_issue));
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let now = Utc::now();
        assert!(!validate_token("secret", "", "u", "POST", now));
        assert!(!validate_token("secret", "no-colon", "u", "POST", now));
        assert!(!validate_token("secret", "mac:notanumber", "u", "POST", now));
    }
}
