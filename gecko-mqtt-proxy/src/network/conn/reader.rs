use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::network::packet::{self, Packet};

use super::Error;

/// 连接的读半部分
/// 以 packet 为单位读取
pub(crate) struct PacketReader<R> {
    stream: R,
    /// 读缓冲区
    /// 使用缓冲区而非按照字节 从 socket 读取数据
    read: BytesMut,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub(crate) fn new(stream: R) -> Self {
        Self {
            stream,
            read: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// 读取一个 packet
    pub(crate) async fn read_packet(&mut self) -> Result<Packet, Error> {
        loop {
            let required = match Packet::read(&mut self.read) {
                Ok(packet) => return Ok(packet),
                Err(packet::Error::InsufficientBytes(n)) => n,
                Err(e) => return Err(Error::Packet(e)),
            };

            // 数据不足，读取更多数据
            self.read_bytes(required).await?;
        }
    }

    /// 等待从 socket 读出至少所需长度的数据，放入缓冲区
    /// 如果读不到指定长度的数据，返回错误
    async fn read_bytes(&mut self, required: usize) -> Result<(), Error> {
        let mut total_read = 0;
        loop {
            let read = self.stream.read_buf(&mut self.read).await?;
            if 0 == read {
                return if self.read.is_empty() {
                    Err(Error::ConnectionClosed)
                } else {
                    Err(Error::ConnectionReset)
                };
            }

            total_read += read;
            if total_read >= required {
                return Ok(());
            }
        }
    }
}
