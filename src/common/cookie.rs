//! HTTPクッキーの構築とSet-Cookieヘッダーの生成

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

use super::utils::{is_header_value_valid, validate_cookie_name_value};
use crate::error::Error;

/// 「無期限」クッキーに使う番兵的な有効期限（2^31 - 1秒、およそ2038年）
const PERMANENT_EPOCH: i64 = 2_147_483_647;

/// SameSite属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// HTTPクッキー
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    /// 新しいクッキーをResultで作成（名前・値を検証する）
    pub fn try_new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        let value = value.into();
        validate_cookie_name_value(&name, &value)?;
        Ok(Self {
            name,
            value,
            path: None,
            domain: None,
            expires: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        })
    }

    /// 新しいクッキーを作成。無効な名前・値はログに出して無害なものに置換する
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        match Self::try_new(name, value) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Cookie::new received invalid name/value: {}", e);
                Self::try_new("invalid", "").expect("static fallback cookie")
            }
        }
    }

    /// 有効期限を秒で指定してクッキーを作成。0は無期限（遠い未来の番兵値）
    pub fn with_age(name: impl Into<String>, value: impl Into<String>, age: i64) -> Self {
        let permanent = Utc.timestamp_opt(PERMANENT_EPOCH, 0).unwrap();
        let expires = if age == 0 {
            permanent
        } else {
            Utc.timestamp_opt(Utc::now().timestamp().saturating_add(age), 0)
                .single()
                .unwrap_or(permanent)
        };
        Self::new(name, value).expires(expires)
    }

    /// パスを設定
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// ドメインを設定
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// 有効期限を設定
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Max-Ageを秒で設定
    pub fn max_age(mut self, secs: i64) -> Self {
        self.max_age = Some(secs);
        self
    }

    /// セキュアフラグを設定
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// HttpOnlyフラグを設定
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// SameSite属性を設定
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Set-Cookieヘッダー値を生成
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);

        if let Some(path) = &self.path {
            if is_header_value_valid(path) && !path.contains(';') {
                out.push_str(&format!("; Path={}", path));
            } else {
                log::warn!("Cookie::to_header_value skipped invalid Path: {:?}", path);
            }
        }

        if let Some(domain) = &self.domain {
            if is_header_value_valid(domain) && !domain.contains(';') {
                out.push_str(&format!("; Domain={}", domain));
            } else {
                log::warn!(
                    "Cookie::to_header_value skipped invalid Domain: {:?}",
                    domain
                );
            }
        }

        if let Some(expires) = &self.expires {
            out.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }

        if let Some(max_age) = &self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }

        if self.secure {
            out.push_str("; Secure");
        }

        if self.http_only {
            out.push_str("; HttpOnly");
        }

        if let Some(same_site) = &self.same_site {
            out.push_str(&format!("; SameSite={}", same_site));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_basic() {
        let cookie = Cookie::new("session_id", "abc123");
        assert_eq!(cookie.name, "session_id");
        assert_eq!(cookie.value, "abc123");
        assert!(!cookie.secure);
        assert!(!cookie.http_only);
    }

    #[test]
    fn test_cookie_header_value() {
        let cookie = Cookie::new("test", "value")
            .path("/app")
            .domain("test.example")
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax);

        let hv = cookie.to_header_value();
        assert!(hv.starts_with("test=value"));
        assert!(hv.contains("Path=/app"));
        assert!(hv.contains("Domain=test.example"));
        assert!(hv.contains("Secure"));
        assert!(hv.contains("HttpOnly"));
        assert!(hv.contains("SameSite=Lax"));
    }

    #[test]
    fn test_cookie_with_age_zero_is_permanent() {
        let cookie = Cookie::with_age("perm", "v", 0);
        // 2038年の番兵値
        assert_eq!(cookie.expires.unwrap().timestamp(), 2_147_483_647);
    }

    #[test]
    fn test_cookie_with_age_offsets_from_now() {
        let cookie = Cookie::with_age("tmp", "v", 60);
        let delta = cookie.expires.unwrap().timestamp() - Utc::now().timestamp();
        assert!((59..=61).contains(&delta));
    }

    #[test]
    fn test_try_new_validation() {
        assert!(Cookie::try_new("SID", "abcDEF123-_.:~").is_ok());
        assert!(Cookie::try_new("SID", "bad;value").is_err());
        assert!(Cookie::try_new("SID", "bad,value").is_err());
        assert!(Cookie::try_new("bad name", "v").is_err());
    }

    #[test]
    fn test_to_header_skips_invalid_attrs() {
        let mut c = Cookie::try_new("A", "B").unwrap();
        c.path = Some("/ok".into());
        c.domain = Some("bad\r\ndomain".into());
        let hv = c.to_header_value();
        assert!(hv.contains("A=B"));
        assert!(hv.contains("Path=/ok"));
        assert!(!hv.contains("Domain"));
    }
}
