use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::core::capability::{client_capabilities, CapabilitySets};
use crate::core::event::{InputEvent, PointerEvent, RdpEvent};
use crate::core::global::base::{
    self, FastPathUpdateType, PduType, PduType2, CTRLACTION_COOPERATE, CTRLACTION_REQUEST_CONTROL,
    FASTPATH_FRAGMENT_FIRST, FASTPATH_FRAGMENT_LAST, FASTPATH_FRAGMENT_NEXT, FASTPATH_FRAGMENT_SINGLE,
};
use crate::model::data::check_remaining;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::rdp_error;

/// Connection automata of the pdu layer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClientState {
    /// Waiting for the server capabilities
    DemandActive,
    /// Capabilities are exchanged, the finalization PDUs
    /// are in flight until the font map arrives
    Finalization,
    /// Steady state, updates flow
    Connected,
}

/// Client of the global channel
///
/// Drives the capability exchange and the finalization
/// handshake, then turns updates into session events.
/// It never touches the socket itself, outgoing PDUs are
/// returned to the session which owns the secured path down
pub struct GlobalClient {
    state: ClientState,
    user_id: u16,
    share_id: u32,
    width: u16,
    height: u16,
    layout: u32,
    server_capabilities: CapabilitySets,
    /// Reassembly buffer of fragmented fast path updates
    fragments: BytesMut,
    fragment_type: Option<FastPathUpdateType>,
}

impl GlobalClient {
    pub fn new(user_id: u16, width: u16, height: u16, layout: u32) -> Self {
        GlobalClient {
            state: ClientState::DemandActive,
            user_id,
            share_id: 0,
            width,
            height,
            layout,
            server_capabilities: CapabilitySets::new(),
            fragments: BytesMut::new(),
            fragment_type: None,
        }
    }

    /// True once the font map arrived
    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Server capability sets of the last demand active
    pub fn server_capabilities(&self) -> &CapabilitySets {
        &self.server_capabilities
    }

    /// Consume one slow path payload of the global channel
    ///
    /// Events are pushed through the callback, the returned
    /// buffers must be sent back on the global channel in order
    pub fn read<T>(&mut self, mut payload: BytesMut, mut callback: T) -> RdpResult<Vec<Vec<u8>>>
    where
        T: FnMut(RdpEvent),
    {
        match base::read_share_control(&mut payload)? {
            PduType::DemandActive => self.read_demand_active(&mut payload),
            PduType::DeactivateAll => {
                debug!("deactivate all, back to capability exchange");
                self.state = ClientState::DemandActive;
                Ok(Vec::new())
            }
            PduType::Data => {
                self.read_data(&mut payload, &mut callback)?;
                Ok(Vec::new())
            }
            PduType::ServerRedirect => Err(rdp_error!(
                RdpErrorKind::NotImplemented,
                "server redirection is not supported"
            )),
            PduType::ConfirmActive => Err(rdp_error!(
                RdpErrorKind::UnexpectedType,
                "confirm active from the server"
            )),
        }
    }

    /// Demand active turns into the whole client finalization
    /// volley: confirm active, synchronize, the two control
    /// PDUs and the font list
    fn read_demand_active(&mut self, payload: &mut BytesMut) -> RdpResult<Vec<Vec<u8>>> {
        if self.state == ClientState::Connected {
            return Err(rdp_error!(
                RdpErrorKind::InvalidAutomata,
                "demand active on a connected session"
            ));
        }

        let demand = base::read_demand_active(payload)?;
        self.share_id = demand.share_id;
        self.server_capabilities = demand.server_capabilities;
        debug!(
            "demand active, share id {:#x}, {} server capability sets",
            self.share_id,
            self.server_capabilities.len()
        );

        let capabilities = client_capabilities(self.width, self.height, 16, self.layout)?;
        let responses = vec![
            base::write_confirm_active(self.share_id, self.user_id, &capabilities)?,
            base::write_synchronize(self.share_id, self.user_id, self.user_id)?,
            base::write_control(self.share_id, self.user_id, CTRLACTION_COOPERATE)?,
            base::write_control(self.share_id, self.user_id, CTRLACTION_REQUEST_CONTROL)?,
            base::write_font_list(self.share_id, self.user_id)?,
        ];
        self.state = ClientState::Finalization;
        Ok(responses)
    }

    fn read_data<T>(&mut self, payload: &mut BytesMut, callback: &mut T) -> RdpResult<()>
    where
        T: FnMut(RdpEvent),
    {
        let pdu_type2 = base::read_share_data_header(payload)?;
        match pdu_type2 {
            PduType2::SetErrorInfo => {
                let code = base::read_error_info(payload)?;
                if code != 0 {
                    return Err(rdp_error!(RdpErrorKind::RejectedByServer, "server error info"));
                }
                Ok(())
            }
            PduType2::Synchronize | PduType2::Control => Ok(()),
            PduType2::FontMap => {
                if self.state == ClientState::Finalization {
                    debug!("font map received, session is ready");
                    self.state = ClientState::Connected;
                    callback(RdpEvent::Ready);
                    Ok(())
                } else {
                    Err(rdp_error!(RdpErrorKind::InvalidAutomata, "unexpected font map"))
                }
            }
            PduType2::Update => {
                if self.state != ClientState::Connected {
                    warn!("update before the finalization completed");
                    return Ok(());
                }
                for bitmap in base::read_update(payload)? {
                    callback(RdpEvent::Bitmap(bitmap));
                }
                Ok(())
            }
            PduType2::Pointer => {
                if self.state != ClientState::Connected {
                    return Ok(());
                }
                if let Some(pointer) = base::read_pointer(payload)? {
                    callback(RdpEvent::Pointer(pointer));
                }
                Ok(())
            }
            PduType2::SaveSessionInfo => {
                debug!("logon notification received");
                Ok(())
            }
            PduType2::ShutdownDenied => Ok(()),
            other => {
                debug!("ignoring data pdu {:?}", other);
                Ok(())
            }
        }
    }

    /// Consume one decrypted fast path payload
    pub fn read_fast_path<T>(&mut self, mut payload: BytesMut, mut callback: T) -> RdpResult<()>
    where
        T: FnMut(RdpEvent),
    {
        for update in base::read_fast_path_updates(&mut payload)? {
            let (update_type, mut data) = match update.fragmentation {
                FASTPATH_FRAGMENT_SINGLE => (update.update_type, update.data),
                FASTPATH_FRAGMENT_FIRST => {
                    self.fragments = update.data;
                    self.fragment_type = Some(update.update_type);
                    continue;
                }
                FASTPATH_FRAGMENT_NEXT => {
                    self.fragments.extend_from_slice(&update.data);
                    continue;
                }
                FASTPATH_FRAGMENT_LAST => {
                    self.fragments.extend_from_slice(&update.data);
                    let update_type = self.fragment_type.take().ok_or_else(|| {
                        rdp_error!(RdpErrorKind::InvalidAutomata, "fragment end without a start")
                    })?;
                    (update_type, std::mem::take(&mut self.fragments))
                }
                _ => continue,
            };

            if self.state != ClientState::Connected {
                warn!("fast path update before the finalization completed");
                continue;
            }

            match update_type {
                FastPathUpdateType::Bitmap => {
                    // the embedded update type word leads the payload
                    check_remaining(&data, 2, "fast path bitmap update")?;
                    data.advance(2);
                    for bitmap in base::read_bitmap_update(&mut data)? {
                        callback(RdpEvent::Bitmap(bitmap));
                    }
                }
                FastPathUpdateType::PointerHidden => {
                    callback(RdpEvent::Pointer(PointerEvent {
                        x: 0,
                        y: 0,
                        visible: false,
                    }));
                }
                FastPathUpdateType::PointerDefault => {
                    callback(RdpEvent::Pointer(PointerEvent {
                        x: 0,
                        y: 0,
                        visible: true,
                    }));
                }
                FastPathUpdateType::PointerPosition => {
                    check_remaining(&data, 4, "fast path pointer position")?;
                    let x = data.get_u16_le();
                    let y = data.get_u16_le();
                    callback(RdpEvent::Pointer(PointerEvent { x, y, visible: true }));
                }
                other => debug!("ignoring fast path update {:?}", other),
            }
        }
        Ok(())
    }

    /// Encode a batch of input events as a slow path input PDU
    pub fn write_input(&self, events: &[InputEvent]) -> RdpResult<Vec<u8>> {
        if self.state != ClientState::Connected {
            return Err(rdp_error!(
                RdpErrorKind::InvalidAutomata,
                "input before the session is ready"
            ));
        }
        base::write_input_pdu(self.share_id, self.user_id, events)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::capability::write_capability_sets;

    fn demand_active_payload() -> BytesMut {
        let capabilities = client_capabilities(800, 600, 16, 0x409).unwrap();
        let raw = write_capability_sets(&capabilities).unwrap();
        let mut body = Vec::new();
        body.extend_from_slice(&0xCAFEu32.to_le_bytes());
        body.extend_from_slice(&4u16.to_le_bytes());
        body.extend_from_slice(&((raw.len() + 4) as u16).to_le_bytes());
        body.extend_from_slice(b"RDP\0");
        body.extend_from_slice(&(capabilities.len() as u16).to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&raw);
        body.extend_from_slice(&0u32.to_le_bytes());

        BytesMut::from(&base::write_share_control(PduType::DemandActive, 1002, &body).unwrap()[..])
    }

    fn font_map_payload() -> BytesMut {
        let body = [0u8; 8];
        BytesMut::from(&base::write_share_data(0xCAFE, 1002, PduType2::FontMap, &body).unwrap()[..])
    }

    fn bitmap_update_payload(left: u16, top: u16) -> BytesMut {
        let mut body = Vec::new();
        // update type bitmap, one uncompressed rectangle
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        for value in [left, top, left + 1, top + 1, 2, 2, 8, 0, 4] {
            body.extend_from_slice(&value.to_le_bytes());
        }
        body.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
        BytesMut::from(&base::write_share_data(0xCAFE, 1002, PduType2::Update, &body).unwrap()[..])
    }

    #[test]
    fn test_demand_active_triggers_finalization_volley() {
        let mut client = GlobalClient::new(1004, 800, 600, 0x409);
        let responses = client.read(demand_active_payload(), |_| {}).unwrap();
        // confirm active, synchronize, two controls and the font list
        assert_eq!(responses.len(), 5);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_ready_fires_on_font_map() {
        let mut client = GlobalClient::new(1004, 800, 600, 0x409);
        client.read(demand_active_payload(), |_| {}).unwrap();

        let mut ready = false;
        client
            .read(font_map_payload(), |event| {
                if matches!(event, RdpEvent::Ready) {
                    ready = true;
                }
            })
            .unwrap();
        assert!(ready);
        assert!(client.is_connected());
    }

    #[test]
    fn test_no_bitmap_before_ready() {
        let mut client = GlobalClient::new(1004, 800, 600, 0x409);
        client.read(demand_active_payload(), |_| {}).unwrap();

        // update sneaking in before the font map is dropped
        let mut events = 0;
        client.read(bitmap_update_payload(0, 0), |_| events += 1).unwrap();
        assert_eq!(events, 0);
    }

    #[test]
    fn test_bitmap_updates_arrive_in_order_after_ready() {
        let mut client = GlobalClient::new(1004, 800, 600, 0x409);
        client.read(demand_active_payload(), |_| {}).unwrap();
        client.read(font_map_payload(), |_| {}).unwrap();

        let mut seen = Vec::new();
        for (left, top) in [(0u16, 0u16), (10, 0), (0, 10)] {
            client
                .read(bitmap_update_payload(left, top), |event| {
                    if let RdpEvent::Bitmap(bitmap) = event {
                        seen.push((bitmap.dest_left, bitmap.dest_top));
                    }
                })
                .unwrap();
        }
        assert_eq!(seen, [(0, 0), (10, 0), (0, 10)]);
    }

    #[test]
    fn test_input_rejected_before_ready() {
        let client = GlobalClient::new(1004, 800, 600, 0x409);
        let result = client.write_input(&[InputEvent::Synchronize { flags: 0 }]);
        assert_eq!(result.unwrap_err().kind(), RdpErrorKind::InvalidAutomata);
    }

    #[test]
    fn test_fast_path_bitmap_after_ready() {
        let mut client = GlobalClient::new(1004, 800, 600, 0x409);
        client.read(demand_active_payload(), |_| {}).unwrap();
        client.read(font_map_payload(), |_| {}).unwrap();

        // fast path frame with one bitmap update of one rectangle
        let mut update = Vec::new();
        update.extend_from_slice(&1u16.to_le_bytes());
        update.extend_from_slice(&1u16.to_le_bytes());
        for value in [0u16, 0, 1, 1, 2, 2, 8, 0, 4] {
            update.extend_from_slice(&value.to_le_bytes());
        }
        update.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);

        let mut frame = Vec::new();
        frame.push(FastPathUpdateType::Bitmap as u8);
        frame.extend_from_slice(&(update.len() as u16).to_le_bytes());
        frame.extend_from_slice(&update);

        let mut bitmaps = 0;
        client
            .read_fast_path(BytesMut::from(&frame[..]), |event| {
                if matches!(event, RdpEvent::Bitmap(_)) {
                    bitmaps += 1;
                }
            })
            .unwrap();
        assert_eq!(bitmaps, 1);
    }

    #[test]
    fn test_fast_path_fragment_reassembly() {
        let mut client = GlobalClient::new(1004, 800, 600, 0x409);
        client.read(demand_active_payload(), |_| {}).unwrap();
        client.read(font_map_payload(), |_| {}).unwrap();

        let mut update = Vec::new();
        update.extend_from_slice(&1u16.to_le_bytes());
        update.extend_from_slice(&1u16.to_le_bytes());
        for value in [0u16, 0, 1, 1, 2, 2, 8, 0, 4] {
            update.extend_from_slice(&value.to_le_bytes());
        }
        update.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);

        let (first, last) = update.split_at(10);
        let mut frame = Vec::new();
        frame.push(FastPathUpdateType::Bitmap as u8 | (FASTPATH_FRAGMENT_FIRST << 4));
        frame.extend_from_slice(&(first.len() as u16).to_le_bytes());
        frame.extend_from_slice(first);
        frame.push(FastPathUpdateType::Bitmap as u8 | (FASTPATH_FRAGMENT_LAST << 4));
        frame.extend_from_slice(&(last.len() as u16).to_le_bytes());
        frame.extend_from_slice(last);

        let mut bitmaps = 0;
        client
            .read_fast_path(BytesMut::from(&frame[..]), |event| {
                if matches!(event, RdpEvent::Bitmap(_)) {
                    bitmaps += 1;
                }
            })
            .unwrap();
        assert_eq!(bitmaps, 1);
    }

    #[test]
    fn test_error_info_is_fatal() {
        let mut client = GlobalClient::new(1004, 800, 600, 0x409);
        client.read(demand_active_payload(), |_| {}).unwrap();

        let mut body = Vec::new();
        // ERRINFO_RPC_INITIATED_DISCONNECT
        body.extend_from_slice(&1u32.to_le_bytes());
        let payload = BytesMut::from(&base::write_share_data(0xCAFE, 1002, PduType2::SetErrorInfo, &body).unwrap()[..]);
        let result = client.read(payload, |_| {});
        assert_eq!(result.unwrap_err().kind(), RdpErrorKind::RejectedByServer);
    }
}
