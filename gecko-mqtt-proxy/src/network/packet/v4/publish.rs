use bytes::{BufMut, Bytes, BytesMut};

use crate::network::{
    packet::{self, Error, QoS},
    topic,
};

use super::FixedHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// 客户端是否之前发送过此消息（是否重新投递）
    pub dup: bool,
    /// 服务质量
    pub qos: QoS,
    /// 消息保留
    pub retain: bool,
    /// 主题
    pub topic: String,
    /// 包 id，qos 0 时没有
    pub packet_id: Option<u16>,
    /// 消息负载
    pub payload: Bytes,
}

impl Publish {
    pub(crate) fn read(fixed_header: &FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        let flags = fixed_header.flags();
        let dup = (flags & 0b1000) != 0;
        let qos = QoS::try_from((flags & 0b0110) >> 1)?;
        let retain = (flags & 0b0001) != 0;

        let topic = packet::read_string(&mut stream)?;
        if !topic::valid_publish_topic(&topic) {
            return Err(Error::InvalidPublishTopic(topic));
        }

        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ => match packet::read_u16(&mut stream)? {
                0 => return Err(Error::MissPacketId),
                id => Some(id),
            },
        };

        // 剩下的全部是负载
        Ok(Publish {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload: stream,
        })
    }

    fn len(&self) -> usize {
        let mut len = 2 + self.topic.len() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            len += 2;
        }
        len
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        // 鉴权回调可能改写过主题
        if !topic::valid_publish_topic(&self.topic) {
            return Err(Error::InvalidPublishTopic(self.topic.clone()));
        }

        let mut byte1 = 0x30 | ((self.qos as u8) << 1);
        if self.dup {
            byte1 |= 0b1000;
        }
        if self.retain {
            byte1 |= 0b0001;
        }
        stream.put_u8(byte1);
        packet::write_remaining_length(stream, self.len())?;

        packet::write_string(stream, &self.topic)?;
        if self.qos != QoS::AtMostOnce {
            let packet_id = self.packet_id.ok_or(Error::MissPacketId)?;
            stream.put_u16(packet_id);
        }
        stream.extend_from_slice(&self.payload);

        Ok(())
    }
}
