//! 共通ユーティリティ（URLエンコード、クエリ解析、ヘッダー検証、日時整形）

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::Error;

/// URLエンコーディングのデコード（`+`はスペースに変換）
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (from_hex(bytes[i + 1]), from_hex(bytes[i + 2])) {
                result.push(h * 16 + l);
                i += 3;
                continue;
            }
        } else if bytes[i] == b'+' {
            result.push(b' ');
            i += 1;
            continue;
        }
        result.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&result).into_owned()
}

/// 16進数文字をバイト値に変換
fn from_hex(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// RFC3986の非予約文字以外をパーセントエンコード
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// クエリ文字列を(key, value)のリストにパースしてURLデコードを行う
///
/// 同名キーの多値を保持するためマップではなくリストを返す。
pub fn parse_query_string(query_string: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if query_string.is_empty() {
        return pairs;
    }
    for pair in query_string.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        if let Some(key) = parts.next() {
            let value = parts.next().unwrap_or("");
            pairs.push((percent_decode(key), percent_decode(value)));
        }
    }
    pairs
}

/// マップをURLエンコードされたフォームデータへ変換
pub fn urlencode(data: &HashMap<String, String>) -> String {
    let mut parts: Vec<String> = data
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect();
    parts.sort();
    parts.join("&")
}

/// 文字列をURLフレンドリーなスラッグへ変換
pub fn slug(s: &str, sep: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let invalid = Regex::new(r"(?i)[^a-z0-9\-_]").expect("static slug regex");
    let replaced = invalid.replace_all(s, sep).into_owned();
    if replaced.is_empty() {
        return String::new();
    }
    let quoted = regex::escape(sep);
    let repeats = Regex::new(&format!("({}){{2,}}", quoted)).expect("static slug regex");
    let collapsed = repeats.replace_all(&replaced, sep).into_owned();
    let ends = Regex::new(&format!("^{}|{}$", quoted, quoted)).expect("static slug regex");
    ends.replace_all(&collapsed, "").to_lowercase()
}

/// ヘッダー値に使用可能な文字かを判定（CRLFと制御文字を拒否）
pub fn is_header_value_valid(value: &str) -> bool {
    value.chars().all(|c| {
        let code = c as u32;
        code >= 0x20 && code != 0x7F
    })
}

/// Cookie名が安全なトークンか（RFC6265準拠の簡易版）
pub fn is_cookie_name_valid(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    const FORBIDDEN: &[char] = &[
        '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '{', '}', ' ',
        '\t', '\r', '\n',
    ];
    name.chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && !FORBIDDEN.contains(&c))
}

/// Cookie値が安全か（RFC6265 cookie-octetの簡易版）
pub fn is_cookie_value_valid(value: &str) -> bool {
    value.chars().all(|c| {
        let b = c as u32;
        matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
    })
}

/// 無効なCookie名/値ならErrorを返す
pub fn validate_cookie_name_value(name: &str, value: &str) -> Result<(), Error> {
    if !is_cookie_name_valid(name) {
        return Err(Error::web(
            500,
            "cookie name contains invalid characters".to_string(),
        ));
    }
    if !is_cookie_value_valid(value) {
        return Err(Error::web(
            500,
            "cookie value contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// HTTPヘッダー用の日時文字列（RFC1123、タイムゾーンはGMT表記）
pub fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
