use bytes::{Buf, BytesMut};
use indexmap::IndexMap;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::core::gcc;
use crate::core::mcs::base::{self, DomainPDU};
use crate::core::tpkt::base::Payload;
use crate::core::x224::client::X224Client;
use crate::model::data::{check_remaining, Message};
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// A frame coming out of the MCS layer
pub enum McsPayload {
    /// Payload of a Send-Data-Indication, keyed by channel id
    Channel(u16, BytesMut),
    /// Fast path frames bypass MCS entirely
    FastPath(u8, BytesMut),
    /// The server left the domain
    Disconnect,
}

/// MCS client
///
/// Runs one domain with a fixed user and the set of channels
/// negotiated during the GCC exchange. Once connected it only
/// moves Send-Data PDUs around
pub struct McsClient<S> {
    transport: X224Client<S>,
    /// Granted by attach user confirm, immutable afterward
    user_id: u16,
    /// Joined channels by name, the io channel is "global"
    channel_ids: IndexMap<String, u16>,
    /// Security data parsed from the conference create response
    server_data: gcc::ServerData,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> McsClient<S> {
    /// Launch the connection sequence of the MCS stack
    ///
    /// Connect-Initial, Connect-Response, Erect-Domain,
    /// Attach-User then one Channel-Join per channel; the layer
    /// is ready when every join got its confirm
    pub async fn connect(
        mut transport: X224Client<S>,
        client_data: gcc::ClientData,
        channels: &[gcc::ChannelDef],
    ) -> RdpResult<McsClient<S>> {
        let mut user_data = Vec::new();
        user_data.extend(gcc::client_core_data(&client_data)?);
        user_data.extend(gcc::client_security_data()?);
        user_data.extend(gcc::client_network_data(channels)?);

        let conference = gcc::write_conference_create_request(&user_data)?;
        transport.write(base::write_connect_initial(&conference)?).await?;

        let payload = Self::expect_raw(&mut transport).await?;
        let user_data = base::read_connect_response(&mut Cursor::new(payload.as_ref()))?;
        let server_data = gcc::read_conference_create_response(&mut Cursor::new(user_data))?;
        debug!(
            "server rdp version {:?}, {} static channels",
            server_data.rdp_version,
            server_data.channel_ids.len()
        );

        transport.write(base::write_erect_domain_request()?).await?;
        transport.write(base::write_attach_user_request()?).await?;

        let payload = Self::expect_raw(&mut transport).await?;
        let user_id = base::read_attach_user_confirm(&mut Cursor::new(payload.as_ref()))?;

        // user channel, io channel then all the static channels
        let mut to_join: Vec<(String, u16)> = vec![
            ("user".to_string(), user_id),
            ("global".to_string(), 1003),
        ];
        for (index, channel_id) in server_data.channel_ids.iter().enumerate() {
            let name = channels
                .get(index)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("channel{}", channel_id));
            to_join.push((name, *channel_id));
        }

        let mut channel_ids = IndexMap::new();
        for (name, channel_id) in to_join {
            transport
                .write(base::write_channel_join_request(user_id, channel_id)?)
                .await?;
            let payload = Self::expect_raw(&mut transport).await?;
            let confirmed = base::read_channel_join_confirm(&mut Cursor::new(payload.as_ref()))?;
            if confirmed != channel_id {
                return Err(rdp_error!(
                    RdpErrorKind::InvalidRespond,
                    "channel join confirm for the wrong channel"
                ));
            }
            channel_ids.insert(name, channel_id);
        }

        Ok(McsClient {
            transport,
            user_id,
            channel_ids,
            server_data,
        })
    }

    async fn expect_raw(transport: &mut X224Client<S>) -> RdpResult<BytesMut> {
        match transport.read().await? {
            Payload::Raw(payload) => Ok(payload),
            Payload::FastPath(_, _) => Err(rdp_error!(
                RdpErrorKind::UnexpectedType,
                "fast path frame during MCS connect"
            )),
        }
    }

    /// Send a payload on a joined channel
    pub async fn write<T: 'static>(&mut self, channel_name: &str, message: T) -> RdpResult<()>
    where
        T: Message + Sync,
    {
        let channel_id = *self
            .channel_ids
            .get(channel_name)
            .ok_or_else(|| rdp_error!(RdpErrorKind::InvalidData, "write on an unjoined channel"))?;
        let header = base::write_send_data_request_header(self.user_id, channel_id, message.length())?;
        self.transport.write((header, message)).await
    }

    /// Read the next frame of the domain
    pub async fn read(&mut self) -> RdpResult<McsPayload> {
        match self.transport.read().await? {
            Payload::FastPath(flag, payload) => Ok(McsPayload::FastPath(flag, payload)),
            Payload::Raw(mut payload) => {
                check_remaining(&payload, 1, "mcs opcode")?;
                let opcode = payload[0];
                match opcode >> 2 {
                    x if x == DomainPDU::SendDataIndication as u8 => {
                        let (channel_id, header_length) = {
                            let mut cursor = Cursor::new(payload.as_ref());
                            cursor.set_position(1);
                            let channel_id = base::read_send_data_indication_header(&mut cursor)?;
                            (channel_id, cursor.position() as usize)
                        };
                        payload.advance(header_length);
                        Ok(McsPayload::Channel(channel_id, payload))
                    }
                    x if x == DomainPDU::DisconnectProviderUltimatum as u8 => {
                        debug!("server sent a disconnect provider ultimatum");
                        Ok(McsPayload::Disconnect)
                    }
                    _ => Err(rdp_error!(RdpErrorKind::UnexpectedType, "unexpected MCS pdu")),
                }
            }
        }
    }

    /// Channel name for a given id, used when dispatching
    pub fn channel_name(&self, channel_id: u16) -> Option<&str> {
        self.channel_ids
            .iter()
            .find(|(_, id)| **id == channel_id)
            .map(|(name, _)| name.as_str())
    }

    /// User id granted during attach user
    pub fn user_id(&self) -> u16 {
        self.user_id
    }

    /// Number of joined channels
    pub fn channel_count(&self) -> usize {
        self.channel_ids.len()
    }

    /// Security data of the conference create response
    pub fn server_security(&self) -> &gcc::ServerSecurityData {
        &self.server_data.security
    }

    pub async fn shutdown(&mut self) -> RdpResult<()> {
        self.transport.shutdown().await
    }
}
