use tokio::io;

use crate::{
    hook::HookError,
    network::{conn, packet::PacketType},
    session::SessionNotInContext,
    stream::Direction,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Read first packet error: {0}")]
    Handshake(#[source] conn::Error),
    #[error("Invalid packet {0}, expected CONNECT packet")]
    ProtocolViolation(PacketType),
    #[error(
        "failed to proxy from MQTT client with id {client_id} to MQTT broker with error: {reason}"
    )]
    Upstream { client_id: String, reason: Reason },
    #[error(
        "failed to proxy from MQTT broker to client with id {client_id} with error: {reason}"
    )]
    Downstream { client_id: String, reason: Reason },
    #[error("Session error: {0}")]
    Session(#[from] SessionNotInContext),
    #[error("Relay loop exited without reporting a result")]
    RelayAborted,
    #[error("Bind listener on {addr} error: {source}")]
    Bind { addr: String, source: io::Error },
}

impl Error {
    /// 出错的转发方向
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Error::Upstream { .. } => Some(Direction::Upstream),
            Error::Downstream { .. } => Some(Direction::Downstream),
            _ => None,
        }
    }

    /// 转发失败的具体原因
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Error::Upstream { reason, .. } | Error::Downstream { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// 转发过程中的失败原因
#[derive(Debug, thiserror::Error)]
pub enum Reason {
    #[error("{0}")]
    Connection(#[from] conn::Error),
    #[error("{0}")]
    Denied(HookError),
    #[error("{0}")]
    Session(#[from] SessionNotInContext),
}
