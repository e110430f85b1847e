//! フラッシュメッセージ：次のリクエストまで保持される一度きりの通知

use crate::context::Context;
use crate::error::Error;

/// アラート用のセキュアクッキー名
pub const FLASH_ALERT_COOKIE: &str = "ZQFA";
/// 通知用のセキュアクッキー名
pub const FLASH_NOTICE_COOKIE: &str = "ZQFN";

const FLASH_AGE_SECS: i64 = 60;

/// 読み出したフラッシュメッセージ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flash {
    pub alert: String,
    pub notice: String,
}

impl<'a> Context<'a> {
    /// アラートメッセージをセットする
    pub fn set_flash_alert(&mut self, message: &str) -> Result<(), Error> {
        self.set_secure_cookie(FLASH_ALERT_COOKIE, message, FLASH_AGE_SECS)
    }

    /// 通知メッセージをセットする
    pub fn set_flash_notice(&mut self, message: &str) -> Result<(), Error> {
        self.set_secure_cookie(FLASH_NOTICE_COOKIE, message, FLASH_AGE_SECS)
    }

    /// フラッシュメッセージを読み出し、読んだものはクッキーごと消す
    pub fn flash(&mut self) -> Flash {
        let mut flash = Flash::default();
        if let Some(alert) = self.get_secure_cookie(FLASH_ALERT_COOKIE) {
            flash.alert = alert;
            self.remove_cookie(FLASH_ALERT_COOKIE);
        }
        if let Some(notice) = self.get_secure_cookie(FLASH_NOTICE_COOKIE) {
            flash.notice = notice;
            self.remove_cookie(FLASH_NOTICE_COOKIE);
        }
        flash
    }
}
