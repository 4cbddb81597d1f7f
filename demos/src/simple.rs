//! 打印所有回调，并按照允许的主题列表做简单的访问控制

use async_trait::async_trait;
use bytes::Bytes;
use gecko_mqtt_proxy::{topic, Authorizer, HookError, Notifier, Session};
use log::{info, warn};

pub struct Simple {
    allowed_topics: Vec<String>,
}

impl Simple {
    pub fn new(allowed_topics: Vec<String>) -> Self {
        Self { allowed_topics }
    }

    /// 订阅的 filter 也按主题处理，落在允许范围内即可
    fn allowed(&self, topic: &str) -> bool {
        self.allowed_topics.is_empty()
            || self
                .allowed_topics
                .iter()
                .any(|filter| filter == topic || topic::matches(topic, filter))
    }
}

#[async_trait]
impl Authorizer for Simple {
    async fn auth_connect(&self, session: &mut Session) -> Result<(), HookError> {
        let cn = session
            .cert
            .as_ref()
            .and_then(|cert| cert.common_name.as_deref())
            .unwrap_or_default();
        info!(
            "AuthConnect() - clientID: {}, username: {}, client_CN: {}",
            session.id, session.username, cn
        );
        Ok(())
    }

    async fn auth_publish(
        &self,
        session: &Session,
        topic: &mut String,
        payload: &mut Bytes,
    ) -> Result<(), HookError> {
        info!(
            "AuthPublish() - clientID: {}, topic: {}, payload: {}",
            session.id,
            topic,
            String::from_utf8_lossy(payload)
        );
        if !self.allowed(topic) {
            return Err(format!("client {} may not publish to {}", session.id, topic).into());
        }
        Ok(())
    }

    async fn auth_subscribe(
        &self,
        session: &Session,
        topics: &mut Vec<String>,
    ) -> Result<(), HookError> {
        info!(
            "AuthSubscribe() - clientID: {}, topics: {}",
            session.id,
            topics.join(",")
        );
        // 去掉不允许的主题，全部不允许时拒绝订阅
        let before = topics.len();
        topics.retain(|t| self.allowed(t));
        if topics.is_empty() {
            return Err(format!("client {} may not subscribe to any requested topic", session.id).into());
        }
        if topics.len() != before {
            warn!(
                "client {} subscription narrowed to {}",
                session.id,
                topics.join(",")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for Simple {
    async fn connect(&self, session: &Session) {
        info!(
            "Connect() - username: {}, clientID: {}",
            session.username, session.id
        );
    }

    async fn publish(&self, session: &Session, topic: &str, payload: &Bytes) {
        info!(
            "Publish() - username: {}, clientID: {}, topic: {}, payload: {}",
            session.username,
            session.id,
            topic,
            String::from_utf8_lossy(payload)
        );
    }

    async fn subscribe(&self, session: &Session, topics: &[String]) {
        info!(
            "Subscribe() - username: {}, clientID: {}, topics: {}",
            session.username,
            session.id,
            topics.join(",")
        );
    }

    async fn unsubscribe(&self, session: &Session, topics: &[String]) {
        info!(
            "Unsubscribe() - username: {}, clientID: {}, topics: {}",
            session.username,
            session.id,
            topics.join(",")
        );
    }

    async fn disconnect(&self, session: &Session) {
        info!(
            "Disconnect() - client with username: {} and ID: {} disconnected",
            session.username, session.id
        );
    }
}
