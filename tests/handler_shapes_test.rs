//! ハンドラーシグネチャのアダプターマトリクスのテスト
//!
//! ハンドラー名の末尾3文字はY/Nのフラグ:
//! 1. &mut Contextを受け取るか
//! 2. 戻り値にボディ（文字列）があるか
//! 3. 戻り値の最後がエラーか

mod common;

use common::{check_all, Test};
use webweave::{Context, Error, Method, Server};

fn handle_nnn() {}

fn handle_nny() -> Result<(), Error> {
    Ok(())
}

fn handle_nyn() -> &'static str {
    "NYN"
}

fn handle_nyy() -> Result<String, Error> {
    Ok("NYY".to_string())
}

fn handle_ynn(ctx: &mut Context) {
    let _ = ctx.write_string("YNN");
}

fn handle_yny(ctx: &mut Context) -> Result<(), Error> {
    ctx.write_string("YNY")?;
    Ok(())
}

fn handle_yyn(ctx: &mut Context) -> String {
    let _ = ctx.write_string("YY");
    "N".to_string()
}

fn handle_yyy(ctx: &mut Context) -> Result<String, Error> {
    ctx.write_string("YY")?;
    Ok("Y".to_string())
}

fn shapes_server() -> Server {
    let mut s = Server::new();
    s.config.color_output = false;
    s.get("/NNN", handle_nnn);
    s.get("/NNY", handle_nny);
    s.get("/NYN", handle_nyn);
    s.get("/NYY", handle_nyy);
    s.get("/YNN", handle_ynn);
    s.get("/YNY", handle_yny);
    s.get("/YYN", handle_yyn);
    s.get("/YYY", handle_yyy);
    s
}

fn shape_tests() -> Vec<Test> {
    let case = |path, expected_body| Test {
        method: Method::GET,
        path,
        headers: &[],
        body: None,
        expected_status: 200,
        expected_body,
    };
    vec![
        case("/NNN", ""),
        case("/NNY", ""),
        case("/NYN", "NYN"),
        case("/NYY", "NYY"),
        case("/YNN", "YNN"),
        case("/YNY", "YNY"),
        case("/YYN", "YYN"),
        case("/YYY", "YYY"),
    ]
}

#[test]
fn test_handler_signatures() {
    let s = shapes_server();
    check_all(&s, &shape_tests());
}

// キャプチャ付きの形（Contextあり・なし）
#[test]
fn test_capture_arities() {
    fn one(a: String) -> String {
        a
    }
    fn two(a: String, b: String) -> String {
        format!("{}-{}", a, b)
    }
    fn three(a: String, b: String, c: String) -> String {
        format!("{}-{}-{}", a, b, c)
    }
    fn ctx_one(_ctx: &mut Context, a: String) -> String {
        format!("ctx:{}", a)
    }
    fn ctx_two(_ctx: &mut Context, a: String, b: String) -> String {
        format!("ctx:{}-{}", a, b)
    }

    let mut s = Server::new();
    s.config.color_output = false;
    s.get("/one/(.+)", one);
    s.get("/two/(.+)/(.+)", two);
    s.get("/three/(.+)/(.+)/(.+)", three);
    s.get("/ctxone/(.+)", ctx_one);
    s.get("/ctxtwo/(.+)/(.+)", ctx_two);

    let case = |path, expected_body| Test {
        method: Method::GET,
        path,
        headers: &[],
        body: None,
        expected_status: 200,
        expected_body,
    };
    check_all(
        &s,
        &[
            case("/one/a", "a"),
            case("/two/a/b", "a-b"),
            case("/three/a/b/c", "a-b-c"),
            case("/ctxone/a", "ctx:a"),
            case("/ctxtwo/a/b", "ctx:a-b"),
        ],
    );
}

// 任意グループはキャプチャ数に含まれない
#[test]
fn test_non_capturing_group() {
    fn show(a: String) -> String {
        format!("got:{}", a)
    }

    let mut s = Server::new();
    s.config.color_output = false;
    s.get("/v(?:1|2)/(.+)", show);

    let ok = common::get_response(&s, Method::GET, "/v1/item", None, &[], &[]);
    assert_eq!(ok.body_str(), "got:item");
    let ok = common::get_response(&s, Method::GET, "/v2/item", None, &[], &[]);
    assert_eq!(ok.body_str(), "got:item");
    let miss = common::get_response(&s, Method::GET, "/v3/item", None, &[], &[]);
    assert_eq!(miss.status, 404);
}

// マッチしなかった任意キャプチャは空文字列として渡される
#[test]
fn test_optional_capture_is_empty_string() {
    fn show(a: String) -> String {
        format!("[{}]", a)
    }

    let mut s = Server::new();
    s.config.color_output = false;
    s.get("/opt(?:/(.+))?", show);

    let with = common::get_response(&s, Method::GET, "/opt/x", None, &[], &[]);
    assert_eq!(with.body_str(), "[x]");
    let without = common::get_response(&s, Method::GET, "/opt", None, &[], &[]);
    assert_eq!(without.body_str(), "[]");
}
