//! リクエストコンテキスト（ラッパー間でのデータ共有）

use std::any::Any;
use std::collections::HashMap;

/// リクエストに紐づく型消去されたキーバリューストア
///
/// ラッパーが認証結果などをハンドラーへ引き渡すために使う。
#[derive(Debug, Default)]
pub struct RequestContext {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// 新しいRequestContextを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 値を設定
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    /// 値を取得
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// 値を削除して返却
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(key)
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// 指定されたキーが存在するか
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// コンテキストが空かどうか
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Clone for RequestContext {
    fn clone(&self) -> Self {
        // Box<dyn Any>は複製できないため空のコンテキストを返す
        Self::new()
    }
}
