//! 网络层
//! 本层只关心报文的编解码与读写，不包含任何鉴权相关逻辑

pub(crate) use conn::{PacketReader, PacketWriter};

pub mod conn;
pub mod packet;
pub mod topic;
