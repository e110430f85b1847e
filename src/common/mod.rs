//! 共通の基本型とユーティリティ

pub mod context;
pub mod cookie;
pub mod http;
pub mod params;
pub mod utils;

pub use context::RequestContext;
pub use cookie::{Cookie, SameSite};
pub use http::{reason_phrase, Headers, Method, Request, Response};
pub use params::Params;
