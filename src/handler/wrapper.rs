//! ラッパー（ミドルウェア）チェーンの合成

use std::sync::Arc;

use super::adapter::AdaptedHandler;
use crate::context::Context;
use crate::error::Error;

/// キャプチャ引数を束縛済みの統一ハンドラー
///
/// ラッパーが受け取る「内側のハンドラー」もこの形。リクエストごとに合成される。
pub type SimpleHandler = Box<dyn Fn(&mut Context) -> Result<(), Error>>;

/// リクエストごとに内側ハンドラーを包むミドルウェア
///
/// 内側ハンドラーはフレームワークからは呼ばれない。ラッパー自身が呼ぶことで、
/// 呼び出し前後の処理・ヘッダー操作・フック登録・ショートサーキット・
/// エラーの変換を自由に行える。
pub type Wrapper = Arc<dyn Fn(&SimpleHandler, &mut Context) -> Result<(), Error> + Send + Sync>;

/// キャプチャ文字列をハンドラーへ閉じ込める
pub(crate) fn bind_captures(handler: AdaptedHandler, captures: Vec<String>) -> SimpleHandler {
    Box::new(move |ctx: &mut Context| handler(ctx, &captures))
}

/// ハンドラーをラッパーで一段包む
pub(crate) fn wrap_handler(wrapper: Wrapper, inner: SimpleHandler) -> SimpleHandler {
    Box::new(move |ctx: &mut Context| wrapper(&inner, ctx))
}
