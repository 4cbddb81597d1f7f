pub(crate) use reader::PacketReader;
pub(crate) use writer::PacketWriter;
use tokio::io;

use super::packet;

mod reader;
mod writer;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Packet error: {0}")]
    Packet(#[from] packet::Error),
    #[error("I/O: {0}")]
    IO(#[from] io::Error),
    /// 对端在报文边界处关闭连接，属于正常结束
    #[error("Connection closed by peer")]
    ConnectionClosed,
    /// 对端在报文中途关闭连接
    #[error("Connection reset by peer")]
    ConnectionReset,
}

impl Error {
    /// 是否是对端正常关闭连接
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }
}
