use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::network::packet::Packet;

use super::Error;

/// 连接的写半部分
/// 以 packet 为单位写入
pub(crate) struct PacketWriter<W> {
    stream: W,
    /// 写缓冲区
    /// 先写入缓冲区再刷入 socket 而非按字节向 socket 写入数据
    write: BytesMut,
}

impl<W: AsyncWrite + Unpin> PacketWriter<W> {
    pub(crate) fn new(stream: W) -> Self {
        Self {
            stream,
            write: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// 编码一个 packet 并立即刷入 socket
    pub(crate) async fn write_packet(&mut self, packet: &Packet) -> Result<(), Error> {
        if let Err(e) = packet.write(&mut self.write) {
            // 丢弃编码了一半的数据
            self.write.clear();
            return Err(Error::Packet(e));
        }
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), Error> {
        if self.write.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.write).await?;
        self.stream.flush().await?;
        self.write.clear();
        Ok(())
    }
}
