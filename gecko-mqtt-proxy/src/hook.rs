//! 用户实现的回调
//! 鉴权回调可以拒绝报文，通知回调只能观察

use async_trait::async_trait;
use bytes::Bytes;

use crate::session::Session;

/// 鉴权回调返回的错误
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// 报文转发给 broker 之前调用
/// 返回错误时报文不会被转发，整个会话结束
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    /// 客户端连接认证，可以修改身份，修改会写回 connect 报文
    async fn auth_connect(&self, session: &mut Session) -> Result<(), HookError>;
    /// 客户端发布消息，可以改写主题和负载
    async fn auth_publish(
        &self,
        session: &Session,
        topic: &mut String,
        payload: &mut Bytes,
    ) -> Result<(), HookError>;
    /// 客户端订阅，可以改写主题列表
    async fn auth_subscribe(
        &self,
        session: &Session,
        topics: &mut Vec<String>,
    ) -> Result<(), HookError>;
}

/// 报文成功转发给 broker 之后调用
/// 内部错误由实现自行处理
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// 会话中转发了 connect 报文，握手时的 connect 报文不会触发
    async fn connect(&self, session: &Session);
    /// 客户端发布了消息
    async fn publish(&self, session: &Session, topic: &str, payload: &Bytes);
    /// 客户端订阅了主题
    async fn subscribe(&self, session: &Session, topics: &[String]);
    /// 客户端取消订阅
    async fn unsubscribe(&self, session: &Session, topics: &[String]);
    /// 客户端连接断开，每个会话只调用一次
    async fn disconnect(&self, session: &Session);
}

/// 代理需要的全部回调
pub trait Handler: Authorizer + Notifier {}

impl<T: Authorizer + Notifier> Handler for T {}

/// 放行所有报文，不做任何通知
pub struct HookNoop;

#[async_trait]
impl Authorizer for HookNoop {
    async fn auth_connect(&self, _session: &mut Session) -> Result<(), HookError> {
        Ok(())
    }

    async fn auth_publish(
        &self,
        _session: &Session,
        _topic: &mut String,
        _payload: &mut Bytes,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn auth_subscribe(
        &self,
        _session: &Session,
        _topics: &mut Vec<String>,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for HookNoop {
    async fn connect(&self, _session: &Session) {}
    async fn publish(&self, _session: &Session, _topic: &str, _payload: &Bytes) {}
    async fn subscribe(&self, _session: &Session, _topics: &[String]) {}
    async fn unsubscribe(&self, _session: &Session, _topics: &[String]) {}
    async fn disconnect(&self, _session: &Session) {}
}
