//! レスポンスライター：ヘッダー確定フックとボディライターのラップ

use std::cell::RefCell;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use crate::common::http::Headers;

/// コネクション乗っ取り後の双方向ストリーム（WebSocketアップグレード用）
pub trait RawStream: io::Read + io::Write + Send {}
impl<T: io::Read + io::Write + Send> RawStream for T {}

/// トランスポートが提供する生のレスポンス出力先
///
/// `write_head`はリクエストにつき一度だけ、最初のボディバイトより先に呼ばれる。
pub trait ResponseSink {
    /// ステータス行とヘッダーを書き出す
    fn write_head(&mut self, status: u16, headers: &Headers) -> io::Result<()>;
    /// ボディデータを書き出す
    fn write_body(&mut self, data: &[u8]) -> io::Result<usize>;
    /// バッファリングしている場合はフラッシュ
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
    /// コネクションの乗っ取り。対応しないシンクはNoneを返す
    fn hijack(&mut self) -> Option<Box<dyn RawStream>> {
        None
    }
}

/// ライターとシンク双方から参照される共有シンクハンドル
pub type SharedSink = Rc<RefCell<dyn ResponseSink>>;

/// ボディライターのスタック要素
///
/// `finish`は自身を閉じて内側のライターを返す。外側から順に閉じることで
/// バッファ済みデータが内側へフラッシュされる。
pub trait BodyWriter: Write {
    fn finish(self: Box<Self>) -> (io::Result<()>, Option<Box<dyn BodyWriter>>);
}

/// スタックの最内側：シンクへ直接書き込むライター
struct SinkBody {
    sink: SharedSink,
    discard: bool,
}

impl Write for SinkBody {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.discard {
            // HEADリクエスト：長さだけ報告してバイトは捨てる
            return Ok(data.len());
        }
        self.sink.borrow_mut().write_body(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.borrow_mut().flush()
    }
}

impl BodyWriter for SinkBody {
    fn finish(self: Box<Self>) -> (io::Result<()>, Option<Box<dyn BodyWriter>>) {
        (Ok(()), None)
    }
}

type AfterHeaderHook = Box<dyn FnOnce(&mut ResponseWriter)>;
type HeadObserver = Box<dyn FnOnce(u16, &Headers)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    Fresh,
    Triggering,
    Sent,
}

/// リクエストごとのレスポンスライター
///
/// 最初の書き込みまたは明示的なステータス設定で、登録順にフックを一度だけ
/// 実行してからシンクへヘッダーを流す。フック内でのボディ書き込みは未定義。
pub struct ResponseWriter {
    sink: SharedSink,
    status: u16,
    headers: Headers,
    content_type_explicit: bool,
    hooks: Vec<AfterHeaderHook>,
    head_observer: Option<HeadObserver>,
    state: HeadState,
    body: Option<Box<dyn BodyWriter>>,
    head_only: bool,
}

impl ResponseWriter {
    pub(crate) fn new(sink: SharedSink, head_only: bool) -> Self {
        let body = SinkBody {
            sink: sink.clone(),
            discard: head_only,
        };
        Self {
            sink,
            status: 200,
            headers: Headers::new(),
            content_type_explicit: false,
            hooks: Vec::new(),
            head_observer: None,
            state: HeadState::Fresh,
            body: Some(Box::new(body)),
            head_only,
        }
    }

    /// 現在のステータスコード
    pub fn status(&self) -> u16 {
        self.status
    }

    /// レスポンスヘッダー
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// ヘッダーが既にシンクへ送られた（または送信中）か
    pub fn headers_sent(&self) -> bool {
        self.state != HeadState::Fresh
    }

    /// ヘッダーを設定（同名は置き換え）
    pub fn set_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type_explicit = true;
        }
        self.headers.set(name, value);
    }

    /// ヘッダーを追加（同名を残す）
    pub fn add_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type_explicit = true;
        }
        self.headers.add(name, value);
    }

    /// ヘッダーを削除
    pub fn remove_header(&mut self, name: &str) {
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type_explicit = false;
        }
        self.headers.remove(name);
    }

    /// ディスパッチャーが設定する既定のContent-Type。明示設定としては扱わない
    pub(crate) fn set_default_content_type(&mut self, value: &str) {
        self.headers.set("Content-Type", value);
        self.content_type_explicit = false;
    }

    /// ハンドラーがContent-Typeを明示的に設定したか
    ///
    /// MIME推定フックはこのフラグを見て、ディスパッチャーの既定値だけを上書きする。
    pub fn content_type_explicit(&self) -> bool {
        self.content_type_explicit
    }

    /// ヘッダー確定後・最初のボディバイト送出前に実行するフックを登録
    ///
    /// 登録順に実行される。フックはヘッダー操作とボディライターのラップのみを行うこと。
    pub fn add_after_header_hook(&mut self, f: impl FnOnce(&mut ResponseWriter) + 'static) {
        self.hooks.push(Box::new(f));
    }

    /// ヘッダー送出の直前に最終的なステータスとヘッダーを観測するコールバック
    pub(crate) fn set_head_observer(&mut self, f: impl FnOnce(u16, &Headers) + 'static) {
        self.head_observer = Some(Box::new(f));
    }

    /// 現在のボディライターをwrapで包む
    ///
    /// 返されたライターはスタックに積まれ、closeで外側から順に閉じられる。
    pub fn wrap_body_writer(
        &mut self,
        wrap: impl FnOnce(Box<dyn BodyWriter>) -> Box<dyn BodyWriter>,
    ) {
        if let Some(inner) = self.body.take() {
            self.body = Some(wrap(inner));
        }
    }

    /// フックを一度だけ実行してからヘッダーをシンクへ送る
    fn trigger_after_headers(&mut self) {
        if self.state != HeadState::Fresh {
            return;
        }
        self.state = HeadState::Triggering;
        let hooks = mem::take(&mut self.hooks);
        for hook in hooks {
            hook(self);
        }
        if let Some(observer) = self.head_observer.take() {
            observer(self.status, &self.headers);
        }
        if let Err(e) = self.sink.borrow_mut().write_head(self.status, &self.headers) {
            log::warn!("failed to write response head: {}", e);
        }
        self.state = HeadState::Sent;
    }

    /// ボディデータを書き込む。初回呼び出しでフックが発火する
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.trigger_after_headers();
        if self.head_only {
            return Ok(data.len());
        }
        match &mut self.body {
            Some(body) => body.write(data),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "response body already closed",
            )),
        }
    }

    /// ステータスコードを記録してフックを発火させる
    ///
    /// シンクへ届くステータスはリクエストにつき一つだけで、最初の呼び出しが勝つ。
    pub fn write_header(&mut self, status: u16) {
        match self.state {
            HeadState::Sent => {
                log::debug!("status {} ignored: headers already sent", status);
            }
            HeadState::Triggering => {
                self.status = status;
            }
            HeadState::Fresh => {
                self.status = status;
                self.trigger_after_headers();
            }
        }
    }

    /// ステータスが成功を示すか（1xx、2xx、3xx）
    pub fn success(&self) -> bool {
        (100..=399).contains(&self.status)
    }

    /// 積まれたボディライターを外側から順に閉じる
    ///
    /// 最初のエラーを返しつつ残りも閉じ切る。
    pub fn close(&mut self) -> io::Result<()> {
        let mut first_err = None;
        let mut current = self.body.take();
        while let Some(writer) = current {
            let (result, inner) = writer.finish();
            if let Err(e) = result {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            current = inner;
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// シンクが対応していればコネクションを乗っ取る
    pub fn hijack(&mut self) -> Option<Box<dyn RawStream>> {
        self.sink.borrow_mut().hijack()
    }
}

impl Write for ResponseWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.body {
            Some(body) => body.flush(),
            None => Ok(()),
        }
    }
}
