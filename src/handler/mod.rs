//! ハンドラーの正規化とラッパーチェーン

pub mod adapter;
pub mod respond;
pub mod wrapper;

pub use adapter::{AdaptedHandler, HttpHandler, IntoHandler, NoContext, TakesContext};
pub use respond::{BodyReader, Json, Respond, WriteBody};
pub use wrapper::{SimpleHandler, Wrapper};
