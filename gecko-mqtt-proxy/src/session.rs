//! 会话身份，以及在调用链上携带身份的上下文

use std::sync::Arc;

use bytes::Bytes;

/// 客户端 TLS 证书
/// 由传输层在 tls 握手后提供，代理本身不做解析
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    /// DER 编码的证书
    pub der: Bytes,
    /// 证书 subject 的 CN
    pub common_name: Option<String>,
}

/// 一个客户端连接的身份
/// 握手时根据 connect 报文生成，鉴权回调可以修改
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// 客户端 id
    pub id: String,
    /// 用户名，没有时为空
    pub username: String,
    /// 密码，没有时为空
    pub password: Bytes,
    /// 客户端证书
    pub cert: Option<Certificate>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("cert", &self.cert)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session not set in context")]
pub struct SessionNotInContext;

/// 携带会话身份的上下文
///
/// 上下文本身不可变，[`Context::with_session`] 返回一个新的上下文，
/// 原来的上下文不受影响，所以可以随意 clone 到不同的任务中，无需加锁。
#[derive(Debug, Clone, Default)]
pub struct Context {
    session: Option<Arc<Session>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// 存入身份，覆盖当前上下文中已有的身份
    pub fn with_session(&self, session: Session) -> Self {
        Self {
            session: Some(Arc::new(session)),
        }
    }

    /// 取出身份，不存在时返回错误
    /// 回调等必须依赖身份的地方使用
    pub fn session(&self) -> Result<&Session, SessionNotInContext> {
        self.session.as_deref().ok_or(SessionNotInContext)
    }

    /// 取出身份，不存在时返回 None
    pub fn try_session(&self) -> Option<&Session> {
        self.session.as_deref()
    }
}
