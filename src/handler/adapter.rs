//! 多様なシグネチャのハンドラーを統一契約へ正規化するアダプター
//!
//! 受理する形は「`&mut Context`を先頭に取るか」「パスのキャプチャ文字列を
//! 何個受け取るか（0〜4）」「戻り値の形（[`Respond`]実装）」の組み合わせ。
//! 形ごとに[`IntoHandler`]の実装を一つずつ用意し、登録時に
//! `Fn(&mut Context, &[String]) -> Result<(), Error>`へ畳み込む。

use std::sync::Arc;

use super::respond::Respond;
use crate::common::http::Request;
use crate::context::Context;
use crate::error::Error;
use crate::writer::ResponseWriter;

/// 統一ハンドラー契約。ディスパッチャーはこの形だけを呼び出す
pub type AdaptedHandler =
    Arc<dyn Fn(&mut Context, &[String]) -> Result<(), Error> + Send + Sync>;

/// `&mut Context`を受け取る形のマーカー
pub enum TakesContext {}

/// `&mut Context`を受け取らない形のマーカー
pub enum NoContext {}

/// ユーザー定義ハンドラーから統一契約への変換
///
/// `ARITY`は受け取るキャプチャ引数の個数。ルート登録時にパターンの
/// キャプチャグループ数と照合される。
pub trait IntoHandler<Args>: Send + Sync + 'static {
    const ARITY: usize;
    fn into_handler(self) -> AdaptedHandler;
}

// キャプチャ引数の個数はディスパッチャーがARITYに合わせて保証する。

impl<F, R> IntoHandler<(NoContext, (), R)> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 0;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, _args: &[String]| self().respond(ctx))
    }
}

impl<F, R> IntoHandler<(NoContext, (String,), R)> for F
where
    F: Fn(String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 1;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| self(args[0].clone()).respond(ctx))
    }
}

impl<F, R> IntoHandler<(NoContext, (String, String), R)> for F
where
    F: Fn(String, String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 2;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| {
            self(args[0].clone(), args[1].clone()).respond(ctx)
        })
    }
}

impl<F, R> IntoHandler<(NoContext, (String, String, String), R)> for F
where
    F: Fn(String, String, String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 3;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| {
            self(args[0].clone(), args[1].clone(), args[2].clone()).respond(ctx)
        })
    }
}

impl<F, R> IntoHandler<(NoContext, (String, String, String, String), R)> for F
where
    F: Fn(String, String, String, String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 4;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| {
            self(
                args[0].clone(),
                args[1].clone(),
                args[2].clone(),
                args[3].clone(),
            )
            .respond(ctx)
        })
    }
}

impl<F, R> IntoHandler<(TakesContext, (), R)> for F
where
    F: Fn(&mut Context) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 0;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, _args: &[String]| self(ctx).respond(ctx))
    }
}

impl<F, R> IntoHandler<(TakesContext, (String,), R)> for F
where
    F: Fn(&mut Context, String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 1;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| {
            self(ctx, args[0].clone()).respond(ctx)
        })
    }
}

impl<F, R> IntoHandler<(TakesContext, (String, String), R)> for F
where
    F: Fn(&mut Context, String, String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 2;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| {
            self(ctx, args[0].clone(), args[1].clone()).respond(ctx)
        })
    }
}

impl<F, R> IntoHandler<(TakesContext, (String, String, String), R)> for F
where
    F: Fn(&mut Context, String, String, String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 3;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| {
            self(ctx, args[0].clone(), args[1].clone(), args[2].clone()).respond(ctx)
        })
    }
}

impl<F, R> IntoHandler<(TakesContext, (String, String, String, String), R)> for F
where
    F: Fn(&mut Context, String, String, String, String) -> R + Send + Sync + 'static,
    R: Respond + 'static,
{
    const ARITY: usize = 4;
    fn into_handler(self) -> AdaptedHandler {
        Arc::new(move |ctx: &mut Context, args: &[String]| {
            self(
                ctx,
                args[0].clone(),
                args[1].clone(),
                args[2].clone(),
                args[3].clone(),
            )
            .respond(ctx)
        })
    }
}

/// 生のHTTPハンドラー
///
/// アダプターを介さず、レスポンスライターとリクエストを直接受け取る。
/// `Server::handle`で登録する。
pub trait HttpHandler: Send + Sync {
    fn serve_http(&self, response: &mut ResponseWriter, request: &Request);
}

impl<F> HttpHandler for F
where
    F: Fn(&mut ResponseWriter, &Request) + Send + Sync,
{
    fn serve_http(&self, response: &mut ResponseWriter, request: &Request) {
        self(response, request)
    }
}
