//! 拡張子からのMIMEタイプ推定

use std::path::Path;

use crate::context::Context;
use crate::error::Error;
use crate::handler::wrapper::SimpleHandler;

/// 拡張子に対応するMIMEタイプを返す。未知の拡張子はNone
pub fn mime_by_extension(ext: &str) -> Option<&'static str> {
    let ctype = match ext.to_ascii_lowercase().as_str() {
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "gif" => "image/gif",
        "gz" => "application/gzip",
        "htm" | "html" => "text/html; charset=utf-8",
        "ico" => "image/x-icon",
        "jpeg" | "jpg" => "image/jpeg",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "md" => "text/markdown; charset=utf-8",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "otf" => "font/otf",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "tar" => "application/x-tar",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        "webm" => "video/webm",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "xml" => "application/xml; charset=utf-8",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(ctype)
}

/// パスの拡張子を取り出す
fn path_extension(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|e| e.to_str())
}

/// ハンドラーが明示しなかった場合にリクエストパスの拡張子から
/// Content-Typeを推定するラッパー
///
/// 成功レスポンスのみが対象。ディスパッチャーが入れた既定値は上書きするが、
/// ハンドラーが明示的に設定した値には触れない。
pub fn guess_mimetype_wrapper(h: &SimpleHandler, ctx: &mut Context) -> Result<(), Error> {
    let path = ctx.request.path.clone();
    ctx.response.add_after_header_hook(move |w| {
        if !w.success() || w.content_type_explicit() {
            return;
        }
        if let Some(ctype) = path_extension(&path).and_then(mime_by_extension) {
            w.set_header("Content-Type", ctype);
        }
    });
    h(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_by_extension() {
        assert_eq!(mime_by_extension("css"), Some("text/css; charset=utf-8"));
        assert_eq!(mime_by_extension("CSS"), Some("text/css; charset=utf-8"));
        assert_eq!(mime_by_extension("html"), Some("text/html; charset=utf-8"));
        assert_eq!(mime_by_extension("png"), Some("image/png"));
        assert_eq!(mime_by_extension("unknown"), None);
        assert_eq!(mime_by_extension(""), None);
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(path_extension("/red.css"), Some("css"));
        assert_eq!(path_extension("/a/b/page.html"), Some("html"));
        assert_eq!(path_extension("/noext"), None);
        assert_eq!(path_extension("/dir.d/noext"), None);
    }
}
