//! セキュアクッキー・セッション・フラッシュ・XSRFの統合テスト

mod common;

use std::sync::Arc;

use common::{build_request, get_response};
use webweave::xsrf;
use webweave::{Context, Error, Method, Server};

const SECRET: &str = "7C19QRmwf3mHZ9CPAaPQ0hsWeufKd";

fn handle_set(ctx: &mut Context, name: String, value: String) -> Result<String, Error> {
    ctx.set_secure_cookie(&name, &value, 60)?;
    Ok(String::new())
}

fn handle_get(ctx: &mut Context, name: String) -> String {
    ctx.get_secure_cookie(&name).unwrap_or_default()
}

fn secure_server() -> Server {
    let mut s = Server::new();
    s.config.color_output = false;
    s.config.cookie_secret = SECRET.to_string();
    s.post("/securecookie/set/(.+)/(.+)", handle_set);
    s.get("/securecookie/get/(.+)", handle_get);
    s
}

/// Set-Cookieから指定した名前の値を取り出す
fn cookie_value(resp: &webweave::Response, name: &str) -> Option<String> {
    resp.set_cookies()
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}

#[test]
fn test_secure_cookie_roundtrip() {
    let s = secure_server();

    let resp = get_response(&s, Method::POST, "/securecookie/set/user/X", None, &[], &[]);
    assert_eq!(resp.status, 200);
    let value = cookie_value(&resp, "user").expect("secure cookie not set");
    assert!(value.contains('|'), "expected base64|base64 layout");

    let cookies = vec![("user".to_string(), value)];
    let resp = get_response(&s, Method::GET, "/securecookie/get/user", None, &[], &cookies);
    assert_eq!(resp.body_str(), "X");
}

/// クッキー値の1文字を別のbase64文字へ差し替える
fn tamper_at(value: &str, index: usize) -> String {
    let mut chars: Vec<char> = value.chars().collect();
    chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
    chars.into_iter().collect()
}

#[test]
fn test_secure_cookie_tamper_rejected() {
    let s = secure_server();

    let resp = get_response(
        &s,
        Method::POST,
        "/securecookie/set/user/sensitive",
        None,
        &[],
        &[],
    );
    let value = cookie_value(&resp, "user").unwrap();
    let sep = value.find('|').unwrap();

    // 暗号文側とMAC側、どちらの1バイト改竄も「存在しない」扱いになる
    for index in [sep / 2, sep + 1 + (value.len() - sep - 1) / 2] {
        let tampered = tamper_at(&value, index);
        assert_ne!(tampered, value);
        let cookies = vec![("user".to_string(), tampered)];
        let resp = get_response(&s, Method::GET, "/securecookie/get/user", None, &[], &cookies);
        assert_eq!(resp.body_str(), "", "tampered cookie at {} was accepted", index);
    }
}

#[test]
fn test_secure_cookie_garbage_rejected() {
    let s = secure_server();
    for bad in ["", "no-separator", "notbase64!|alsonot!", "YWJj"] {
        let cookies = vec![("user".to_string(), bad.to_string())];
        let resp = get_response(&s, Method::GET, "/securecookie/get/user", None, &[], &cookies);
        assert_eq!(resp.body_str(), "", "garbage cookie {:?} was accepted", bad);
    }
}

#[test]
fn test_missing_secret_is_server_error() {
    let mut s = Server::new();
    s.config.color_output = false;
    // シークレット未設定
    s.post("/securecookie/set/(.+)/(.+)", handle_set);

    let resp = get_response(&s, Method::POST, "/securecookie/set/user/X", None, &[], &[]);
    // MissingCookieSecretはWebエラーではないため一般的な500になる
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body_str(), "Server Error");
}

#[test]
fn test_session_id_issued_and_stable() {
    fn handle_session(ctx: &mut Context) -> String {
        ctx.session_id()
    }

    let mut s = Server::new();
    s.config.color_output = false;
    s.get("/session", handle_session);

    let resp = get_response(&s, Method::GET, "/session", None, &[], &[]);
    let sid = resp.body_str();
    assert_eq!(sid.len(), 36);
    assert!(sid.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(cookie_value(&resp, "ZQSESSID"), Some(sid.clone()));

    // 同じクッキーを送ると同じIDが返り、再発行されない
    let cookies = vec![("ZQSESSID".to_string(), sid.clone())];
    let resp = get_response(&s, Method::GET, "/session", None, &[], &cookies);
    assert_eq!(resp.body_str(), sid);
    assert_eq!(cookie_value(&resp, "ZQSESSID"), None);
}

#[test]
fn test_session_store_shared_across_requests() {
    use webweave::{MemorySessionStore, SessionStore};

    fn handle_save(ctx: &mut Context) -> Result<String, Error> {
        let sid = ctx.session_id();
        let store = ctx.session_store().expect("store configured");
        store.set(&sid, "name", b"alice")?;
        Ok(sid)
    }

    fn handle_load(ctx: &mut Context) -> Result<String, Error> {
        let sid = ctx.session_id();
        let store = ctx.session_store().expect("store configured");
        let value = store.get(&sid, "name")?.unwrap_or_default();
        Ok(String::from_utf8_lossy(&value).into_owned())
    }

    let mut s = Server::new();
    s.config.color_output = false;
    s.set_session_store(Arc::new(MemorySessionStore::new()));
    s.get("/save", handle_save);
    s.get("/load", handle_load);

    let resp = get_response(&s, Method::GET, "/save", None, &[], &[]);
    let sid = resp.body_str();

    let cookies = vec![("ZQSESSID".to_string(), sid)];
    let resp = get_response(&s, Method::GET, "/load", None, &[], &cookies);
    assert_eq!(resp.body_str(), "alice");
}

#[test]
fn test_flash_read_once() {
    fn handle_flash_set(ctx: &mut Context) -> Result<String, Error> {
        ctx.set_flash_alert("disk is full")?;
        ctx.set_flash_notice("saved")?;
        Ok(String::new())
    }

    fn handle_flash_read(ctx: &mut Context) -> String {
        let flash = ctx.flash();
        format!("{}|{}", flash.alert, flash.notice)
    }

    let mut s = Server::new();
    s.config.color_output = false;
    s.config.cookie_secret = SECRET.to_string();
    s.post("/flash/set", handle_flash_set);
    s.get("/flash/read", handle_flash_read);

    let resp = get_response(&s, Method::POST, "/flash/set", None, &[], &[]);
    let alert = cookie_value(&resp, "ZQFA").expect("flash alert cookie");
    let notice = cookie_value(&resp, "ZQFN").expect("flash notice cookie");

    let cookies = vec![
        ("ZQFA".to_string(), alert),
        ("ZQFN".to_string(), notice),
    ];
    let resp = get_response(&s, Method::GET, "/flash/read", None, &[], &cookies);
    assert_eq!(resp.body_str(), "disk is full|saved");
    // 読んだフラッシュは失効クッキーで消される
    let removed = resp
        .headers
        .get_all("Set-Cookie")
        .into_iter()
        .filter(|c| c.contains("Max-Age=0"))
        .count();
    assert_eq!(removed, 2);
}

fn xsrf_uid(_ctx: &Context) -> String {
    "user-1".to_string()
}

fn handle_form(ctx: &mut Context) -> String {
    xsrf::form_field(ctx)
}

fn handle_submit(ctx: &mut Context) -> String {
    if xsrf::validate(ctx) {
        "accepted".to_string()
    } else {
        "rejected".to_string()
    }
}

fn xsrf_server() -> Server {
    let mut s = Server::new();
    s.config.color_output = false;
    s.config.cookie_secret = SECRET.to_string();
    s.set_xsrf("xsrf signing secret", Arc::new(xsrf_uid));
    s.add_wrapper(xsrf::xsrf_wrapper);
    s.get("/form", handle_form);
    s.post("/submit", handle_submit);
    s
}

/// hidden inputのvalue属性からトークンを取り出す
fn token_from_form(body: &str) -> String {
    let start = body.find("value=\"").unwrap() + 7;
    let end = body[start..].find('"').unwrap();
    body[start..start + end].to_string()
}

#[test]
fn test_xsrf_issue_and_validate() {
    let s = xsrf_server();

    let resp = get_response(&s, Method::GET, "/form", None, &[], &[]);
    assert!(resp.body_str().contains("name=\"_xsrf\""));
    let token = token_from_form(&resp.body_str());
    assert!(!token.is_empty());
    let cookie = cookie_value(&resp, "_xsrf").expect("xsrf cookie set");

    // クッキーとフォーム値が揃っていれば通る
    let body = format!("_xsrf={}", webweave::common::utils::percent_encode(&token));
    let req = build_request(
        Method::POST,
        "/submit",
        Some(&body),
        &[("Content-Type", "application/x-www-form-urlencoded")],
        &[("_xsrf".to_string(), cookie.clone())],
    );
    let resp = s.respond(req);
    assert_eq!(resp.body_str(), "accepted");

    // フォーム値が無ければ弾かれる
    let req = build_request(Method::POST, "/submit", None, &[], &[("_xsrf".to_string(), cookie)]);
    let resp = s.respond(req);
    assert_eq!(resp.body_str(), "rejected");

    // クッキーも無ければトークン自体が空で弾かれる
    let resp = get_response(&s, Method::POST, "/submit", None, &[], &[]);
    assert_eq!(resp.body_str(), "rejected");
}

#[test]
fn test_xsrf_cookie_reused_when_present() {
    let s = xsrf_server();

    let first = get_response(&s, Method::GET, "/form", None, &[], &[]);
    let token = token_from_form(&first.body_str());
    let cookie = cookie_value(&first, "_xsrf").unwrap();

    // 既存クッキーがあれば同じトークンが使われ、新規発行されない
    let cookies = vec![("_xsrf".to_string(), cookie)];
    let second = get_response(&s, Method::GET, "/form", None, &[], &cookies);
    assert_eq!(token_from_form(&second.body_str()), token);
    assert_eq!(cookie_value(&second, "_xsrf"), None);
}
