use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::network::{
    packet::{self, read_u8, Error, QoS},
    topic,
};

use super::FixedHeader;

/// topics 与 qos 分开存放，方便鉴权回调直接改写主题列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    /// 订阅的主题
    pub topics: Vec<String>,
    /// 与 topics 按下标一一对应的服务质量
    pub qos: Vec<QoS>,
}

impl Subscribe {
    pub(crate) fn read(fixed_header: &FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        if fixed_header.flags() != 0b0010 {
            return Err(Error::IncorrectPacketFormat);
        }
        let packet_id = packet::read_u16(&mut stream)?;

        let mut topics = Vec::new();
        let mut qos = Vec::new();
        while stream.has_remaining() {
            let filter = packet::read_string(&mut stream)?;
            if !topic::valid_subscribe_filter(&filter) {
                return Err(Error::InvalidSubscribeFilter(filter));
            }
            let options = read_u8(&mut stream)?;

            topics.push(filter);
            qos.push(QoS::try_from(options & 0b0000_0011)?);
        }

        if topics.is_empty() {
            return Err(Error::PayloadRequired);
        }

        Ok(Self {
            packet_id,
            topics,
            qos,
        })
    }

    /// 第 index 个主题的服务质量
    /// 回调新增的主题沿用最后一个请求的 qos
    fn qos_at(&self, index: usize) -> QoS {
        self.qos
            .get(index)
            .or_else(|| self.qos.last())
            .copied()
            .unwrap_or(QoS::AtMostOnce)
    }

    fn len(&self) -> usize {
        2 + self.topics.iter().map(|t| 2 + t.len() + 1).sum::<usize>()
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        if self.topics.is_empty() {
            return Err(Error::PayloadRequired);
        }
        if let Some(filter) = self
            .topics
            .iter()
            .find(|f| !topic::valid_subscribe_filter(f))
        {
            return Err(Error::InvalidSubscribeFilter(filter.clone()));
        }

        stream.put_u8(0x82);
        packet::write_remaining_length(stream, self.len())?;
        stream.put_u16(self.packet_id);
        for (index, filter) in self.topics.iter().enumerate() {
            packet::write_string(stream, filter)?;
            stream.put_u8(self.qos_at(index) as u8);
        }

        Ok(())
    }
}
