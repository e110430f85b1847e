//! リクエストパラメータ（クエリ文字列とPOSTボディの集約）

use std::collections::HashMap;

use crate::error::Error;

/// ディスパッチ時に構築されるパラメータマップ
///
/// 名前ごとの先頭値に加えて多値のリストも保持する。
#[derive(Debug, Clone, Default)]
pub struct Params {
    first: HashMap<String, String>,
    all: HashMap<String, Vec<String>>,
}

impl Params {
    /// 新しい空のパラメータマップを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 値を追加。先頭値は最初の挿入が勝つ
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        self.first.entry(key.clone()).or_insert_with(|| value.clone());
        self.all.entry(key).or_default().push(value);
    }

    /// 先頭値を取得
    pub fn get(&self, key: &str) -> Option<&str> {
        self.first.get(key).map(String::as_str)
    }

    /// 全ての値を取得
    pub fn get_all(&self, key: &str) -> &[String] {
        self.all.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// パラメータを取得。存在しない場合はステータス400のエラー
    pub fn get_string(&self, key: &str) -> Result<String, Error> {
        self.first
            .get(key)
            .cloned()
            .ok_or_else(|| Error::web(400, format!("Required parameter {} missing", key)))
    }

    /// パラメータを整数として取得。存在しない・整数でない場合はステータス400のエラー
    pub fn get_int(&self, key: &str) -> Result<i64, Error> {
        self.get_string(key)?
            .parse()
            .map_err(|_| Error::web(400, format!("Illegal integer parameter {}", key)))
    }

    /// (key, 先頭値)の走査
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.first.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_wins() {
        let mut p = Params::new();
        p.insert("a", "1");
        p.insert("a", "2");
        p.insert("a", "3");
        assert_eq!(p.get("a"), Some("1"));
        assert_eq!(p.get_all("a"), &["1", "2", "3"]);
    }

    #[test]
    fn test_get_string_missing() {
        let p = Params::new();
        let err = p.get_string("k").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Required parameter k missing");
    }

    #[test]
    fn test_get_int() {
        let mut p = Params::new();
        p.insert("i", "40");
        p.insert("k", "abc");
        assert_eq!(p.get_int("i").unwrap(), 40);

        let err = p.get_int("k").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Illegal integer parameter k");
    }

    #[test]
    fn test_get_all_missing_is_empty() {
        let p = Params::new();
        assert!(p.get_all("nope").is_empty());
    }
}
