//! 3.1.1 协议版本报文

use std::{fmt, slice::Iter};

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use connect::*;
pub use publish::*;
pub use subscribe::*;
pub use unsubscribe::*;

use super::Error;

pub mod connect;
pub mod publish;
pub mod subscribe;
pub mod unsubscribe;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Connect => "CONNECT",
            PacketType::ConnAck => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::PubAck => "PUBACK",
            PacketType::PubRec => "PUBREC",
            PacketType::PubRel => "PUBREL",
            PacketType::PubComp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::SubAck => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::UnsubAck => "UNSUBACK",
            PacketType::PingReq => "PINGREQ",
            PacketType::PingResp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub(crate) struct FixedHeader {
    /// 固定头的第一个字节，包含报文类型和flags
    byte1: u8,
    // 固定头的大小
    fixed_header_len: usize,
    // 剩余长度大小
    remaining_len: usize,
}

impl FixedHeader {
    #[inline]
    fn packet_type(&self) -> Result<PacketType, Error> {
        let num = self.byte1 >> 4;
        match num {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            n => Err(Error::InvalidPacketType(n)),
        }
    }

    /// 整个完整报文的字节长度
    #[inline]
    fn packet_len(&self) -> usize {
        self.fixed_header_len + self.remaining_len
    }

    /// 低四位 flags
    #[inline]
    pub(crate) fn flags(&self) -> u8 {
        self.byte1 & 0x0F
    }

    fn read_from(mut stream: Iter<u8>) -> Result<Self, Error> {
        let stream_len = stream.len();
        if stream_len < 2 {
            return Err(Error::InsufficientBytes(2 - stream_len));
        }
        // 第一个字节
        let byte1 = match stream.next() {
            Some(byte) => *byte,
            None => return Err(Error::InsufficientBytes(2)),
        };

        // 剩余字节长度
        let mut remaining_len: usize = 0;
        // 固定头长度，包含第一个字节
        let mut header_len = 1;
        let mut done = false;
        let mut shift = 0;

        for byte in stream {
            // 固定头长度 + 1
            header_len += 1;
            // 剩余长度字节
            let byte = *byte as usize;
            // 字节的后七位 * 128 + 上一个字节
            remaining_len += (byte & 0x7F) << shift;

            // 是否还有后续 remining_len 字节
            done = (byte & 0x80) == 0;
            if done {
                break;
            }

            shift += 7;

            // 剩余长度字节最多四个字节（0，7，14，21）
            if shift > 21 {
                return Err(Error::MalformedPacket);
            }
        }

        if !done {
            return Err(Error::InsufficientBytes(1));
        }

        Ok(Self {
            byte1,
            fixed_header_len: header_len,
            remaining_len,
        })
    }
}

/// 代理不关心内容的报文，按原始字节转发
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Other {
    packet_type: PacketType,
    /// 固定头第一个字节
    byte1: u8,
    /// 可变报头 + 负载
    body: Bytes,
}

impl Other {
    fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        stream.put_u8(self.byte1);
        super::write_remaining_length(stream, self.body.len())?;
        stream.extend_from_slice(&self.body);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    Publish(Publish),
    Subscribe(Subscribe),
    Unsubscribe(Unsubscribe),
    Other(Other),
}

impl Packet {
    /// 从缓冲区解析出一个完整报文
    /// 数据不足时返回 InsufficientBytes，缓冲区保持不变
    pub(crate) fn read(stream: &mut BytesMut) -> Result<Self, Error> {
        let stream_len = stream.len();
        let fixed_header = FixedHeader::read_from(stream.iter())?;

        let packet_len = fixed_header.packet_len();
        if stream_len < packet_len {
            return Err(Error::InsufficientBytes(packet_len - stream_len));
        }

        // 报文类型
        let packet_type = fixed_header.packet_type()?;

        // 根据固定头给出的长度信息，取出整个报文字节（包含报文头）
        // split_to 方法会更新 stream
        let mut packet = stream.split_to(packet_len).freeze();
        // 去掉固定头的报文
        packet.advance(fixed_header.fixed_header_len);

        let packet = match packet_type {
            PacketType::Connect => Packet::Connect(Connect::read(packet)?),
            PacketType::Publish => Packet::Publish(Publish::read(&fixed_header, packet)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::read(&fixed_header, packet)?),
            PacketType::Unsubscribe => {
                Packet::Unsubscribe(Unsubscribe::read(&fixed_header, packet)?)
            }
            packet_type => Packet::Other(Other {
                packet_type,
                byte1: fixed_header.byte1,
                body: packet,
            }),
        };

        Ok(packet)
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        match self {
            Packet::Connect(connect) => connect.write(stream),
            Packet::Publish(publish) => publish.write(stream),
            Packet::Subscribe(subscribe) => subscribe.write(stream),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write(stream),
            Packet::Other(other) => other.write(stream),
        }
    }

    #[inline]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::Publish(_) => PacketType::Publish,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::Other(other) => other.packet_type,
        }
    }
}
