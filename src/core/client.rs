use bytes::BytesMut;
use tracing::debug;

use crate::core::event::{InputEvent, MouseButton, RdpEvent};
use crate::core::gcc::{ChannelDef, ClientData, KeyboardLayout, Version};
use crate::core::global::client::GlobalClient;
use crate::core::license::{License, LicenseAction};
use crate::core::mcs::client::{McsClient, McsPayload};
use crate::core::sec::{self, SecurityContext, SEC_INFO_PKT, SEC_LICENSE_PKT};
use crate::core::tpkt::client::TpktClient;
use crate::core::x224::base::Protocols;
use crate::core::x224::client::X224Client;
use crate::model::error::{RdpErrorKind, RdpResult};
use crate::model::link::Stream;
use crate::model::rnd::random;
use crate::nla::ntlm::Ntlm;
use crate::rdp_error;

/// Builder of a session with all its negotiable knobs
///
/// # Example
/// ```rust,ignore
/// let mut connector = Connector::new()
///     .screen(1024, 768)
///     .credentials("domain".to_string(), "user".to_string(), "pass".to_string());
/// let mut client = connector.connect("192.168.0.1:3389").await?;
/// ```
pub struct Connector {
    width: u16,
    height: u16,
    domain: String,
    username: String,
    password: String,
    /// Client machine name sent in the core data
    name: String,
    layout: KeyboardLayout,
    security_protocols: u32,
    check_certificate: bool,
    restricted_admin_mode: bool,
    blank_creds: bool,
    static_channels: Vec<ChannelDef>,
}

impl Connector {
    pub fn new() -> Self {
        Connector {
            width: 800,
            height: 600,
            domain: String::new(),
            username: String::new(),
            password: String::new(),
            name: "rdp-client".to_string(),
            layout: KeyboardLayout::US,
            security_protocols: Protocols::ProtocolSSL as u32 | Protocols::ProtocolHybrid as u32,
            check_certificate: false,
            restricted_admin_mode: false,
            blank_creds: false,
            static_channels: Vec::new(),
        }
    }

    /// Desktop size negotiated in the core data
    pub fn screen(mut self, width: u16, height: u16) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn credentials(mut self, domain: String, username: String, password: String) -> Self {
        self.domain = domain;
        self.username = username;
        self.password = password;
        self
    }

    pub fn set_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn layout(mut self, layout: KeyboardLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Restrict the negotiation to the given protocol mask
    ///
    /// An empty mask requests standard RDP security only,
    /// which is what servers without TLS need
    pub fn security_protocols(mut self, protocols: u32) -> Self {
        self.security_protocols = protocols;
        self
    }

    pub fn check_certificate(mut self, check: bool) -> Self {
        self.check_certificate = check;
        self
    }

    pub fn restricted_admin_mode(mut self, enabled: bool) -> Self {
        self.restricted_admin_mode = enabled;
        self
    }

    pub fn blank_creds(mut self, enabled: bool) -> Self {
        self.blank_creds = enabled;
        self
    }

    /// Register a static virtual channel before connect
    ///
    /// The channel is joined during the MCS sequence, payload
    /// handling beyond the plumbing is up to the caller
    pub fn add_static_channel(mut self, name: &str, options: u32) -> Self {
        self.static_channels.push(ChannelDef {
            name: name.to_string(),
            options,
        });
        self
    }

    /// Run the whole connection sequence against `addr`
    ///
    /// TCP with a bounded connect, X224 negotiation with an
    /// eventual TLS or CredSSP upgrade, MCS domain and channels,
    /// the security exchange when standard security won, then
    /// the Info PDU. Licensing and the capability exchange are
    /// driven by the read loop of the returned client
    pub async fn connect(&mut self, addr: &str) -> RdpResult<RdpClient> {
        let stream = Stream::connect(addr).await?;
        let tpkt = TpktClient::new(stream);

        let host = addr.split(':').next().unwrap_or(addr).to_string();
        let mut ntlm = Ntlm::new(self.domain.clone(), self.username.clone(), self.password.clone());
        let x224 = X224Client::connect(
            tpkt,
            &self.username,
            &host,
            self.security_protocols,
            self.check_certificate,
            Some(&mut ntlm),
            self.restricted_admin_mode,
            self.blank_creds,
        )
        .await?;

        let selected = x224.selected_protocol();
        let mut mcs = McsClient::connect(
            x224,
            ClientData {
                width: self.width,
                height: self.height,
                layout: self.layout,
                server_selected_protocol: selected as u32,
                rdp_version: Version::RdpVersion5plus,
                name: self.name.clone(),
            },
            &self.static_channels,
        )
        .await?;

        // standard security only activates when no enhanced
        // security was selected
        let mut security = SecurityContext::disabled();
        let mut server_certificate = None;
        if selected == Protocols::ProtocolRDP {
            let server_security = mcs.server_security().clone();
            if server_security.encryption_method == 0 {
                return Err(rdp_error!(
                    RdpErrorKind::InvalidRespond,
                    "standard security selected without encryption"
                ));
            }
            let method = sec::check_encryption_method(server_security.encryption_method);
            let certificate = sec::parse_server_certificate(&server_security.server_certificate)?;

            let client_random = random(32);
            security = SecurityContext::new(&client_random, &server_security.server_random, method);
            let exchange = sec::write_security_exchange(&client_random, &certificate)?;
            mcs.write("global", exchange).await?;
            server_certificate = Some(server_security.server_certificate);
        }

        let info = sec::write_info(&self.domain, &self.username, &self.password);
        let sealed = security.seal(SEC_INFO_PKT, &info)?;
        mcs.write("global", sealed).await?;
        debug!("info pdu sent, entering the licensing phase");

        let user_id = mcs.user_id();
        Ok(RdpClient {
            mcs,
            security,
            license: Some(License::new(&self.username, &self.name, server_certificate)),
            global: GlobalClient::new(user_id, self.width, self.height, self.layout as u32),
        })
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected session
///
/// One task drives `read` in a loop and dispatches the events,
/// sends go through the input methods. The whole session is
/// single owner, callers wanting concurrent reads and writes
/// put it behind their own lock
pub struct RdpClient {
    mcs: McsClient<Stream>,
    security: SecurityContext,
    /// Some until the license exchange settled
    license: Option<License>,
    global: GlobalClient,
}

impl RdpClient {
    /// Read one frame and drive the state machines
    ///
    /// Protocol events are delivered synchronously through the
    /// callback, in wire order. A clean server teardown shows
    /// up as [`RdpEvent::Disconnect`], socket failures as errors
    pub async fn read<T>(&mut self, mut callback: T) -> RdpResult<()>
    where
        T: FnMut(RdpEvent),
    {
        match self.mcs.read().await? {
            McsPayload::FastPath(sec_flags, mut payload) => {
                self.security.decrypt_fast_path(sec_flags, &mut payload)?;
                self.global.read_fast_path(payload, callback)
            }
            McsPayload::Channel(channel_id, payload) => {
                let channel_name = self.mcs.channel_name(channel_id).map(str::to_string);
                match channel_name.as_deref() {
                    Some("global") => self.read_global(payload, callback).await,
                    Some(name) => {
                        // plumbing only, payloads of other static
                        // channels have no handler here
                        debug!("dropping {} bytes on channel {}", payload.len(), name);
                        Ok(())
                    }
                    None => Err(rdp_error!(
                        RdpErrorKind::InvalidRespond,
                        "data on an unjoined channel"
                    )),
                }
            }
            McsPayload::Disconnect => {
                debug!("server closed the domain");
                callback(RdpEvent::Disconnect);
                Ok(())
            }
        }
    }

    async fn read_global<T>(&mut self, mut payload: BytesMut, callback: T) -> RdpResult<()>
    where
        T: FnMut(RdpEvent),
    {
        if self.license.is_some() || self.security.encryption_enabled() {
            let flags = self.security.parse_header(&mut payload)?;

            if flags & SEC_LICENSE_PKT != 0 {
                let license = match self.license.as_mut() {
                    Some(license) => license,
                    None => {
                        debug!("late license packet ignored");
                        return Ok(());
                    }
                };
                match license.handle_packet(&payload)? {
                    LicenseAction::Respond(response) => {
                        let sealed = self.security.seal(SEC_LICENSE_PKT, &response)?;
                        self.mcs.write("global", sealed).await?;
                    }
                    LicenseAction::Completed => {
                        debug!("licensing phase over");
                        self.license = None;
                    }
                }
                return Ok(());
            }

            // the capability exchange follows right after licensing
            self.license = None;
        }

        let responses = self.global.read(payload, callback)?;
        for response in responses {
            let sealed = self.security.seal(0, &response)?;
            self.mcs.write("global", sealed).await?;
        }
        Ok(())
    }

    /// True once the capability exchange and the finalization
    /// handshake completed
    pub fn is_ready(&self) -> bool {
        self.global.is_connected()
    }

    /// Send a batch of input events
    pub async fn write_input(&mut self, events: &[InputEvent]) -> RdpResult<()> {
        let pdu = self.global.write_input(events)?;
        let sealed = self.security.seal(0, &pdu)?;
        self.mcs.write("global", sealed).await
    }

    pub async fn key_down(&mut self, code: u16, extended: bool) -> RdpResult<()> {
        self.write_input(&[InputEvent::ScanCode {
            code,
            is_release: false,
            is_extended: extended,
        }])
        .await
    }

    pub async fn key_up(&mut self, code: u16, extended: bool) -> RdpResult<()> {
        self.write_input(&[InputEvent::ScanCode {
            code,
            is_release: true,
            is_extended: extended,
        }])
        .await
    }

    pub async fn mouse_move(&mut self, x: u16, y: u16) -> RdpResult<()> {
        self.write_input(&[InputEvent::Mouse {
            x,
            y,
            button: None,
            is_pressed: false,
        }])
        .await
    }

    pub async fn mouse_down(&mut self, button: MouseButton, x: u16, y: u16) -> RdpResult<()> {
        self.write_input(&[InputEvent::Mouse {
            x,
            y,
            button: Some(button),
            is_pressed: true,
        }])
        .await
    }

    pub async fn mouse_up(&mut self, button: MouseButton, x: u16, y: u16) -> RdpResult<()> {
        self.write_input(&[InputEvent::Mouse {
            x,
            y,
            button: Some(button),
            is_pressed: false,
        }])
        .await
    }

    pub async fn mouse_wheel(&mut self, delta: i16, x: u16, y: u16) -> RdpResult<()> {
        self.write_input(&[InputEvent::Wheel { x, y, delta }]).await
    }

    pub async fn sync_toggle_keys(&mut self, flags: u32) -> RdpResult<()> {
        self.write_input(&[InputEvent::Synchronize { flags }]).await
    }

    /// Close the session, pending reads unblock with an error
    pub async fn shutdown(&mut self) -> RdpResult<()> {
        self.mcs.shutdown().await
    }
}
