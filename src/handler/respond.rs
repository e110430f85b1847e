//! ハンドラー戻り値をレスポンスボディへ変換するトレイト

use std::io::{self, Read, Write};

use serde::Serialize;

use crate::context::Context;
use crate::error::Error;

/// ハンドラーの戻り値をボディへ書き出す変換
///
/// 文字列・バイト列はContent-Lengthを設定してそのまま書き込み、
/// `Result`は最後の返り値をエラーとして扱う。
pub trait Respond {
    fn respond(self, ctx: &mut Context) -> Result<(), Error>;
}

/// バイト列をContent-Length付きで書き込む
fn write_with_length(ctx: &mut Context, body: &[u8]) -> Result<(), Error> {
    if !ctx.response.headers_sent() && !ctx.response.headers().contains("Content-Length") {
        ctx.response
            .set_header("Content-Length", &body.len().to_string());
    }
    ctx.write(body)?;
    Ok(())
}

impl Respond for () {
    fn respond(self, _ctx: &mut Context) -> Result<(), Error> {
        Ok(())
    }
}

impl Respond for String {
    fn respond(self, ctx: &mut Context) -> Result<(), Error> {
        write_with_length(ctx, self.as_bytes())
    }
}

impl Respond for &'static str {
    fn respond(self, ctx: &mut Context) -> Result<(), Error> {
        write_with_length(ctx, self.as_bytes())
    }
}

impl Respond for Vec<u8> {
    fn respond(self, ctx: &mut Context) -> Result<(), Error> {
        write_with_length(ctx, &self)
    }
}

impl<R: Respond> Respond for Result<R, Error> {
    fn respond(self, ctx: &mut Context) -> Result<(), Error> {
        // エラーの場合は何も書かずにそのまま返す
        self?.respond(ctx)
    }
}

/// 任意のReaderをストリームコピーでボディへ流す戻り値
pub struct BodyReader<R: Read>(pub R);

impl<R: Read> Respond for BodyReader<R> {
    fn respond(mut self, ctx: &mut Context) -> Result<(), Error> {
        io::copy(&mut self.0, &mut ctx.response)?;
        Ok(())
    }
}

/// ライターへ直接書き込むクロージャを戻り値にする形
pub struct WriteBody<F: FnOnce(&mut dyn Write) -> io::Result<()>>(pub F);

impl<F: FnOnce(&mut dyn Write) -> io::Result<()>> Respond for WriteBody<F> {
    fn respond(self, ctx: &mut Context) -> Result<(), Error> {
        (self.0)(&mut ctx.response)?;
        Ok(())
    }
}

/// JSONレスポンス。Content-Typeをapplication/jsonに設定する
pub struct Json<T: Serialize>(pub T);

impl<T: Serialize> Respond for Json<T> {
    fn respond(self, ctx: &mut Context) -> Result<(), Error> {
        let body = serde_json::to_vec(&self.0)
            .map_err(|e| Error::ResponseSerialization(e.to_string()))?;
        ctx.response.set_header("Content-Type", "application/json");
        write_with_length(ctx, &body)
    }
}
