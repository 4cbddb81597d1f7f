use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::network::packet::{self, Error};

use super::FixedHeader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    /// 包 id
    pub packet_id: u16,
    /// 取消订阅的主题
    pub topics: Vec<String>,
}

impl Unsubscribe {
    pub(crate) fn read(fixed_header: &FixedHeader, mut stream: Bytes) -> Result<Self, Error> {
        if fixed_header.flags() != 0b0010 {
            return Err(Error::IncorrectPacketFormat);
        }
        let packet_id = packet::read_u16(&mut stream)?;
        let mut topics = Vec::with_capacity(1);

        while stream.has_remaining() {
            topics.push(packet::read_string(&mut stream)?);
        }

        if topics.is_empty() {
            return Err(Error::PayloadRequired);
        }

        Ok(Self { packet_id, topics })
    }

    fn len(&self) -> usize {
        2 + self.topics.iter().map(|t| 2 + t.len()).sum::<usize>()
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        stream.put_u8(0xA2);
        packet::write_remaining_length(stream, self.len())?;
        stream.put_u16(self.packet_id);
        for topic in &self.topics {
            packet::write_string(stream, topic)?;
        }
        Ok(())
    }
}
