//! 静的ファイルの解決と配信

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::context::Context;
use crate::error::Error;
use crate::mimetype::mime_by_extension;
use crate::server::Server;

/// 既定の静的ファイルルート（実行ファイルと同じ場所のstatic/）
fn default_static_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("static")))
}

/// URLパスを相対パスへ変換する。親ディレクトリ参照などは拒否
fn sanitize(urlpath: &str) -> Option<PathBuf> {
    let rel = Path::new(urlpath.trim_start_matches('/'));
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return None,
        }
    }
    Some(rel.to_path_buf())
}

impl Server {
    fn static_root(&self) -> Option<PathBuf> {
        self.config.static_dir.clone().or_else(default_static_dir)
    }

    /// リクエストパスに対応する静的ファイルを探す
    pub(crate) fn find_static_file(&self, urlpath: &str) -> Option<PathBuf> {
        let root = self.static_root()?;
        let path = root.join(sanitize(urlpath)?);
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    /// ディレクトリに対するindex.html / index.htmを探す
    pub(crate) fn find_index_file(&self, urlpath: &str) -> Option<PathBuf> {
        let root = self.static_root()?;
        let dir = root.join(sanitize(urlpath)?);
        for name in ["index.html", "index.htm"] {
            let path = dir.join(name);
            if path.is_file() {
                return Some(path);
            }
        }
        None
    }
}

/// ファイルを読み込んでレスポンスへ書き出す
pub(crate) fn serve_file(ctx: &mut Context, path: &Path) -> Result<(), Error> {
    let data = fs::read(path)?;
    if let Some(ctype) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_by_extension)
    {
        ctx.response.set_header("Content-Type", ctype);
    }
    ctx.response
        .set_header("Content-Length", &data.len().to_string());
    ctx.write(&data)?;
    Ok(())
}
