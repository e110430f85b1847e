//! Content-Encoding圧縮ラッパー

use std::io::{self, Write};

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::context::Context;
use crate::error::Error;
use crate::handler::wrapper::SimpleHandler;
use crate::writer::{BodyWriter, ResponseWriter};

/// このプレフィックスにマッチするMIMEタイプだけを圧縮する
const COMPRESSIBLE_PREFIXES: [&str; 4] = [
    "text/",
    "application/json",
    "application/xml",
    "application/javascript",
];

fn compressible(ctype: &str) -> bool {
    COMPRESSIBLE_PREFIXES
        .iter()
        .any(|prefix| ctype.starts_with(prefix))
}

/// gzipエンコーダを積んだボディライター
struct GzipBody {
    inner: GzEncoder<Box<dyn BodyWriter>>,
}

impl Write for GzipBody {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl BodyWriter for GzipBody {
    fn finish(self: Box<Self>) -> (io::Result<()>, Option<Box<dyn BodyWriter>>) {
        match self.inner.finish() {
            Ok(inner) => (Ok(()), Some(inner)),
            Err(e) => (Err(e), None),
        }
    }
}

/// deflate（zlibストリーム）エンコーダを積んだボディライター
struct DeflateBody {
    inner: ZlibEncoder<Box<dyn BodyWriter>>,
}

impl Write for DeflateBody {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl BodyWriter for DeflateBody {
    fn finish(self: Box<Self>) -> (io::Result<()>, Option<Box<dyn BodyWriter>>) {
        match self.inner.finish() {
            Ok(inner) => (Ok(()), Some(inner)),
            Err(e) => (Err(e), None),
        }
    }
}

/// 条件を満たす場合にレスポンスを圧縮する
///
/// 内側ハンドラーがヘッダーを確定した後・最初のボディバイト送出前に
/// 呼ばれる必要がある（フックとして実行される）。
fn compress_response(w: &mut ResponseWriter, accept_encoding: &str) {
    if !compressible(w.headers().get("Content-Type").unwrap_or("")) {
        return;
    }
    // 二重エンコードはしない
    if w.headers().contains("Content-Encoding") {
        return;
    }
    // q値は見ない
    if accept_encoding.contains("gzip") {
        w.wrap_body_writer(|inner| {
            Box::new(GzipBody {
                inner: GzEncoder::new(inner, Compression::default()),
            })
        });
        w.set_header("Content-Encoding", "gzip");
        w.remove_header("Content-Length");
    } else if accept_encoding.contains("deflate") {
        w.wrap_body_writer(|inner| {
            Box::new(DeflateBody {
                inner: ZlibEncoder::new(inner, Compression::default()),
            })
        });
        w.set_header("Content-Encoding", "deflate");
        w.remove_header("Content-Length");
    }
}

/// クライアントが受理し、レスポンスが適していれば圧縮するラッパー
pub fn compress_wrapper(h: &SimpleHandler, ctx: &mut Context) -> Result<(), Error> {
    let accept_encoding = ctx
        .request
        .header("Accept-Encoding")
        .unwrap_or("")
        .to_string();
    ctx.response
        .add_after_header_hook(move |w| compress_response(w, &accept_encoding));
    h(ctx)
}
