//! 一个 mqtt 代理库
//!
//! 代理位于客户端与 broker 之间，双向转发报文。connect、publish、subscribe、
//! unsubscribe 报文在转发前后会调用用户实现的回调，用户可以借此在协议层实现
//! 访问控制、审计或者改写消息，而无需修改客户端和 broker。
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gecko_mqtt_proxy::{config::Config, proxy::Proxy, HookNoop};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Config::from_path("./standalone.toml").await?;
//! Proxy::new(cfg).start_with_handler(Arc::new(HookNoop)).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hook;
mod network;
pub mod proxy;
pub mod session;
pub mod stream;

pub use error::{Error, Reason};
pub use hook::{Authorizer, Handler, HookError, HookNoop, Notifier};
pub use network::{
    conn::Error as ConnError,
    packet::{Error as PacketError, PacketType},
    topic,
};
pub use session::{Certificate, Context, Session, SessionNotInContext};
pub use stream::{start, Direction};
