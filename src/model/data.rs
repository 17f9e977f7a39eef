use async_trait::async_trait;
use bytes::Buf;
use std::io::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// All is a message
///
/// A message can be written to or read from an async stream,
/// and knows its encoded length so that enclosing headers can
/// be computed before anything is emitted
#[async_trait]
pub trait Message: Send {
    /// Write node to the stream
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()>;

    /// Read node from the stream
    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()>;

    /// Length in bytes of the encoded element
    fn length(&self) -> usize;
}

#[async_trait]
impl Message for u8 {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        writer.write_u8(*self).await
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()> {
        *self = reader.read_u8().await?;
        Ok(())
    }

    #[inline]
    fn length(&self) -> usize {
        1
    }
}

/// A value with an explicit wire endianness
#[derive(Copy, Clone)]
pub enum Value<Type> {
    /// Big Endianness
    BE(Type),
    /// Little Endianness
    LE(Type),
}

impl<Type: Copy + PartialEq> Value<Type> {
    /// Return the inner value
    ///
    /// # Example
    /// ```
    /// use rdp_client::model::data::U32;
    /// let x = U32::LE(4);
    /// assert_eq!(x.inner(), 4);
    /// ```
    pub fn inner(&self) -> Type {
        match self {
            Value::<Type>::BE(e) | Value::<Type>::LE(e) => *e,
        }
    }
}

impl<Type: Copy + PartialEq> PartialEq for Value<Type> {
    fn eq(&self, other: &Self) -> bool {
        self.inner() == other.inner()
    }
}

/// Unsigned 16 bits message
pub type U16 = Value<u16>;

#[async_trait]
impl Message for U16 {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        match self {
            U16::BE(value) => writer.write_u16(*value).await,
            U16::LE(value) => writer.write_u16_le(*value).await,
        }
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()> {
        match self {
            U16::BE(value) => *value = reader.read_u16().await?,
            U16::LE(value) => *value = reader.read_u16_le().await?,
        }
        Ok(())
    }

    fn length(&self) -> usize {
        2
    }
}

/// Unsigned 32 bits message
pub type U32 = Value<u32>;

#[async_trait]
impl Message for U32 {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        match self {
            U32::BE(value) => writer.write_u32(*value).await,
            U32::LE(value) => writer.write_u32_le(*value).await,
        }
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()> {
        match self {
            U32::BE(value) => *value = reader.read_u32().await?,
            U32::LE(value) => *value = reader.read_u32_le().await?,
        }
        Ok(())
    }

    fn length(&self) -> usize {
        4
    }
}

#[async_trait]
impl Message for Vec<u8> {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        writer.write_all(self).await
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()> {
        reader.read_exact(self).await?;
        Ok(())
    }

    fn length(&self) -> usize {
        self.len()
    }
}

#[async_trait]
impl<const N: usize> Message for [u8; N] {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        writer.write_all(self).await
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()> {
        reader.read_exact(self).await?;
        Ok(())
    }

    fn length(&self) -> usize {
        N
    }
}

#[async_trait]
impl<A: Message + Sync, B: Message + Sync> Message for (A, B) {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        self.0.write_to(writer).await?;
        self.1.write_to(writer).await
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()> {
        self.0.read_from(reader).await?;
        self.1.read_from(reader).await
    }

    fn length(&self) -> usize {
        self.0.length() + self.1.length()
    }
}

#[async_trait]
impl<A: Message + Sync, B: Message + Sync, C: Message + Sync> Message for (A, B, C) {
    async fn write_to(&self, writer: &mut (impl AsyncWrite + Unpin + Send)) -> Result<()> {
        self.0.write_to(writer).await?;
        self.1.write_to(writer).await?;
        self.2.write_to(writer).await
    }

    async fn read_from(&mut self, reader: &mut (impl AsyncRead + Unpin + Send)) -> Result<()> {
        self.0.read_from(reader).await?;
        self.1.read_from(reader).await?;
        self.2.read_from(reader).await
    }

    fn length(&self) -> usize {
        self.0.length() + self.1.length() + self.2.length()
    }
}

/// Encode a message into a standalone buffer
///
/// Upper layers build their payload this way before handing
/// it to the layer below for framing
pub async fn to_vec<T: Message>(message: &T) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(message.length());
    // writing into a Vec cannot fail
    let _ = message.write_to(&mut buffer).await;
    buffer
}

/// Guard against truncated payloads before using the panicking
/// `bytes::Buf` getters on a parsed frame
pub fn check_remaining(buffer: &impl Buf, expected: usize, context: &str) -> RdpResult<()> {
    if buffer.remaining() < expected {
        return Err(rdp_error!(RdpErrorKind::InvalidSize, context));
    }
    Ok(())
}
