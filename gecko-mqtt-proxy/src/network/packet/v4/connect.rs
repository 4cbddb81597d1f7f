use bytes::{BufMut, Bytes, BytesMut};

use crate::network::packet::{self, Error, QoS};

/// 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// v3.1，协议名 MQIsdp
    V3,
    /// v3.1.1，协议名 MQTT
    V4,
}

impl Protocol {
    fn name(&self) -> &'static str {
        match self {
            Protocol::V3 => "MQIsdp",
            Protocol::V4 => "MQTT",
        }
    }

    fn level(&self) -> u8 {
        match self {
            Protocol::V3 => 3,
            Protocol::V4 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// 协议版本
    pub protocol: Protocol,
    /// keepalive
    pub keep_alive: u16,
    /// 客户端id
    pub client_id: String,
    /// 是否开启新会话
    pub clean_session: bool,
    /// 遗嘱消息
    pub last_will: Option<LastWill>,
    /// 登录凭证
    pub login: Option<Login>,
}

impl Connect {
    pub(crate) fn read(mut stream: Bytes) -> Result<Self, Error> {
        // 可变报头
        let protocol_name = packet::read_string(&mut stream)?;
        let protocol_level = packet::read_u8(&mut stream)?;
        let protocol = match (protocol_name.as_str(), protocol_level) {
            ("MQTT", 4) => Protocol::V4,
            ("MQIsdp", 3) => Protocol::V3,
            ("MQTT", num) | ("MQIsdp", num) => return Err(Error::InvalidProtocolLevel(num)),
            _ => return Err(Error::InvalidProtocol(protocol_name)),
        };

        let connect_flags = packet::read_u8(&mut stream)?;
        // 保留位必须为 0
        if connect_flags & 0b1 != 0 {
            return Err(Error::IncorrectPacketFormat);
        }
        let clean_session = (connect_flags & 0b10) != 0;
        let keep_alive = packet::read_u16(&mut stream)?;

        let client_id = packet::read_string(&mut stream)?;
        let last_will = LastWill::read(connect_flags, &mut stream)?;
        let login = Login::read(connect_flags, &mut stream)?;

        Ok(Connect {
            protocol,
            keep_alive,
            client_id,
            clean_session,
            last_will,
            login,
        })
    }

    fn len(&self) -> usize {
        // 协议名 + 协议级别 + connect flags + keepalive
        let mut len = 2 + self.protocol.name().len() + 1 + 1 + 2;
        len += 2 + self.client_id.len();
        if let Some(last_will) = &self.last_will {
            len += 2 + last_will.topic.len() + 2 + last_will.message.len();
        }
        if let Some(login) = &self.login {
            len += 2 + login.username.len();
            if let Some(password) = &login.password {
                len += 2 + password.len();
            }
        }
        len
    }

    /// 根据字段重新计算 connect flags
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= 0b10;
        }
        if let Some(last_will) = &self.last_will {
            flags |= 0b100 | ((last_will.qos as u8) << 3);
            if last_will.retain {
                flags |= 0b0010_0000;
            }
        }
        if let Some(login) = &self.login {
            flags |= 0b1000_0000;
            if login.password.is_some() {
                flags |= 0b0100_0000;
            }
        }
        flags
    }

    pub(crate) fn write(&self, stream: &mut BytesMut) -> Result<(), Error> {
        stream.put_u8(0x10);
        packet::write_remaining_length(stream, self.len())?;

        packet::write_string(stream, self.protocol.name())?;
        stream.put_u8(self.protocol.level());
        stream.put_u8(self.flags());
        stream.put_u16(self.keep_alive);

        packet::write_string(stream, &self.client_id)?;
        if let Some(last_will) = &self.last_will {
            packet::write_string(stream, &last_will.topic)?;
            packet::write_bytes(stream, &last_will.message)?;
        }
        if let Some(login) = &self.login {
            packet::write_string(stream, &login.username)?;
            if let Some(password) = &login.password {
                packet::write_bytes(stream, password)?;
            }
        }

        Ok(())
    }
}

/// 遗嘱设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    /// 遗嘱发送的目标主题
    pub topic: String,
    // 遗嘱消息
    pub message: Bytes,
    /// 服务质量
    pub qos: QoS,
    /// 消息保留
    pub retain: bool,
}

impl LastWill {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<LastWill>, Error> {
        let last_will = match connect_flags & 0b100 {
            0 if (connect_flags & 0b0011_1000) != 0 => {
                return Err(Error::IncorrectPacketFormat);
            }
            0 => None,
            _ => Some(LastWill {
                topic: packet::read_string(stream)?,
                message: packet::read_bytes(stream)?,
                qos: QoS::try_from((connect_flags & 0b11000) >> 3)?,
                retain: (connect_flags & 0b0010_0000) != 0,
            }),
        };

        Ok(last_will)
    }
}

/// 登录凭证
/// 没有用户名时不允许携带密码，所以密码挂在用户名下面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// 用户名
    pub username: String,
    /// 密码
    pub password: Option<Bytes>,
}

impl Login {
    fn read(connect_flags: u8, stream: &mut Bytes) -> Result<Option<Login>, Error> {
        let has_username = connect_flags & 0b1000_0000 != 0;
        let has_password = connect_flags & 0b0100_0000 != 0;

        match (has_username, has_password) {
            (false, false) => Ok(None),
            (false, true) => Err(Error::IncorrectPacketFormat),
            (true, _) => {
                let username = packet::read_string(stream)?;
                let password = match has_password {
                    true => Some(packet::read_bytes(stream)?),
                    false => None,
                };
                Ok(Some(Login { username, password }))
            }
        }
    }
}
