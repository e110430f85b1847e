//! セッションIDの発行とセッションストレージの抽象

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use rand::RngCore;

use crate::common::cookie::Cookie;
use crate::context::Context;
use crate::error::Error;

/// セッションIDを保持するクッキー名
pub const SESSION_COOKIE: &str = "ZQSESSID";

/// 16進表記でのセッションID長
const SESSION_ID_LEN: usize = 36;

/// セッションストレージの抽象
///
/// 複数のリクエストタスクから並行に呼ばれるため、実装は内部で
/// 排他制御を行うこと。
pub trait SessionStore: Send + Sync {
    /// セッションのキーに値を保存する
    fn set(&self, sid: &str, key: &str, value: &[u8]) -> Result<(), Error>;
    /// セッションのキーから値を取得する
    fn get(&self, sid: &str, key: &str) -> Result<Option<Vec<u8>>, Error>;
    /// セッションのキーを削除する
    fn clear(&self, sid: &str, key: &str) -> Result<(), Error>;
}

/// メモリ上の参照実装。Mutexで直列化する
///
/// プロセスを跨いだ永続化はしない。本番ではRedis等を使った実装に差し替えること。
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn set(&self, sid: &str, key: &str, value: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock().expect("session store poisoned");
        inner
            .entry(sid.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, sid: &str, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let inner = self.inner.lock().expect("session store poisoned");
        Ok(inner.get(sid).and_then(|m| m.get(key)).cloned())
    }

    fn clear(&self, sid: &str, key: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().expect("session store poisoned");
        if let Some(m) = inner.get_mut(sid) {
            m.remove(key);
        }
        Ok(())
    }
}

/// ランダムな36文字の16進セッションIDを生成する
fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut id = String::with_capacity(SESSION_ID_LEN);
    for b in bytes {
        let _ = write!(id, "{:02x}", b);
    }
    id
}

impl<'a> Context<'a> {
    /// クッキーからセッションIDを取得する。無ければ新規発行して設定する
    pub fn session_id(&mut self) -> String {
        if let Some(value) = self.request.cookie(SESSION_COOKIE) {
            if value.len() == SESSION_ID_LEN {
                return value;
            }
        }
        self.set_new_session_id()
    }

    /// 新しいセッションIDを発行してクッキーに設定する
    pub fn set_new_session_id(&mut self) -> String {
        let sid = new_session_id();
        self.set_cookie(Cookie::with_age(SESSION_COOKIE, sid.clone(), 0));
        sid
    }

    /// サーバーに設定されたセッションストレージを取得する
    pub fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        self.server.session_store()
    }
}
