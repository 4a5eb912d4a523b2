use crate::audit::events::LogEntry;
use crate::context::{AppContext, ConnectionContext};
use crate::ssh::channel::{serve_channel, ChannelRequest};
use crate::ssh::payload::{
    encode_signal, encode_terminal_modes, CommandRequestPayload, AUTH_AGENT_REQ, EXEC, SIGNAL,
};
use crate::ssh::session::ClientSession;
use crate::ssh::transport::RusshChannel;
use crate::ssh::wire::WireWriter;
use crate::utils::generate_correlation_id;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use russh::server::{Auth, Msg, Response, Session};
use russh::{Channel, ChannelId, ChannelMsg, MethodKind, MethodSet};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Client data chunks queued per channel. When full, reading from the client
/// channel waits until the program catches up.
pub const CLIENT_DATA_CAPACITY: usize = 64;

/// Per-connection SSH handler
pub struct SshHandler {
    ctx: Arc<AppContext>,
    peer_addr: SocketAddr,
    conn_id: String,
    session_state: ClientSession,
    conn: Option<Arc<ConnectionContext>>,
    /// Request queues of open session channels. Dropping one ends that channel's event loop.
    channels: DashMap<ChannelId, mpsc::UnboundedSender<ChannelRequest>>,
    connection_logged: bool,
    next_channel_id: usize,
    total_auth_attempts: u32,
}

impl SshHandler {
    pub fn new(ctx: Arc<AppContext>, peer_addr: SocketAddr) -> Self {
        let conn_id = generate_correlation_id();
        ctx.metrics.record_connection_opened();
        info!(conn_id = %conn_id, peer = %peer_addr, "Connection accepted");
        Self {
            ctx,
            peer_addr,
            conn_id,
            session_state: ClientSession::new(),
            conn: None,
            channels: DashMap::new(),
            connection_logged: false,
            next_channel_id: 0,
            total_auth_attempts: 0,
        }
    }

    fn log_event(&self, entry: LogEntry) {
        self.ctx
            .events
            .log_event(self.peer_addr, &self.conn_id, entry);
    }

    /// Per-connection channel numbers, shared by session and direct-tcpip channels.
    fn allocate_channel_id(&mut self) -> usize {
        let id = self.next_channel_id;
        self.next_channel_id += 1;
        id
    }

    /// Methods still worth offering after a rejection.
    fn remaining_methods(&self) -> MethodSet {
        let auth = &self.ctx.config.auth;
        let mut methods = Vec::new();
        if auth.password_auth.enabled {
            methods.push(MethodKind::Password);
        }
        if auth.public_key_auth.enabled {
            methods.push(MethodKind::PublicKey);
        }
        if auth.keyboard_interactive_auth.enabled {
            methods.push(MethodKind::KeyboardInteractive);
        }
        MethodSet::from(methods.as_slice())
    }

    fn reject_disabled(&self) -> Auth {
        Auth::Reject {
            proceed_with_methods: Some(self.remaining_methods()),
            partial_success: false,
        }
    }

    /// Record the `connection` event once the client is in. The matching
    /// `connection_close` is only logged for connections that got this far.
    pub fn log_connection(&mut self, client_version: &[u8]) {
        if self.connection_logged {
            return;
        }
        self.connection_logged = true;
        let client_version = String::from_utf8_lossy(client_version).trim_end().to_string();
        debug!(conn_id = %self.conn_id, client_version = %client_version, "Client identified");
        self.log_event(LogEntry::Connection { client_version });
    }

    /// Questions sent to a client starting keyboard-interactive authentication.
    pub fn keyboard_interactive_challenge(&self) -> Auth {
        let policy = &self.ctx.config.auth.keyboard_interactive_auth;
        let prompts: Vec<(Cow<'static, str>, bool)> = policy
            .questions
            .iter()
            .map(|q| (Cow::Owned(q.text.clone()), q.echo))
            .collect();
        Auth::Partial {
            name: Cow::Borrowed(""),
            instructions: Cow::Owned(policy.instruction.clone()),
            prompts: Cow::Owned(prompts),
        }
    }

    /// Log the answers to the keyboard-interactive questions and decide the attempt.
    pub fn keyboard_interactive_answers(&mut self, user: &str, answers: Vec<String>) -> Auth {
        let accepted = self.ctx.config.auth.keyboard_interactive_auth.accepted;
        self.log_event(LogEntry::KeyboardInteractiveAuth {
            user: user.to_string(),
            answers,
            accepted,
        });
        self.conclude_auth(user, "keyboard-interactive", accepted)
    }

    /// Count the attempt and turn the policy decision into an answer for the client.
    fn conclude_auth(&mut self, user: &str, method: &str, accepted: bool) -> Auth {
        self.total_auth_attempts += 1;
        self.ctx.metrics.record_auth_attempt(method, accepted);

        if accepted {
            info!(conn_id = %self.conn_id, user = %user, method = %method, "Auth accepted");
            self.session_state.accept(user, method);
            self.conn = Some(Arc::new(ConnectionContext {
                app: self.ctx.clone(),
                peer: self.peer_addr,
                conn_id: self.conn_id.clone(),
                user: user.to_string(),
            }));
            return Auth::Accept;
        }

        debug!(
            conn_id = %self.conn_id,
            user = %user,
            method = %method,
            attempt = self.total_auth_attempts,
            "Auth rejected"
        );
        let max_tries = self.ctx.config.auth.max_tries;
        if max_tries > 0 && self.total_auth_attempts >= max_tries {
            warn!(conn_id = %self.conn_id, peer = %self.peer_addr, max_tries, "Max auth attempts reached");
            return Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            };
        }
        Auth::Reject {
            proceed_with_methods: Some(self.remaining_methods()),
            partial_success: false,
        }
    }

    /// Queue a request for the channel's event loop. Returns false if nothing will handle it.
    fn forward(&self, channel: ChannelId, request: ChannelRequest) -> bool {
        match self.channels.get(&channel) {
            Some(requests) => {
                if requests.send(request).is_err() {
                    debug!(conn_id = %self.conn_id, channel = ?channel, "Channel event loop gone, request dropped");
                    return false;
                }
                true
            }
            None => {
                debug!(conn_id = %self.conn_id, channel = ?channel, request = %request.kind, "Request for unknown channel");
                false
            }
        }
    }

    /// Queue a request and wait for the event loop's verdict. Anything other
    /// than an explicit success is reported to the client as a failure.
    async fn forward_for_reply(&self, channel: ChannelId, mut request: ChannelRequest) -> bool {
        let answer = request.reply_channel();
        if !self.forward(channel, request) {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    /// Forward a request the client may want answered and answer it from the
    /// callback, while russh still knows whether a reply was asked for.
    async fn forward_and_reply(
        &self,
        channel: ChannelId,
        payload: CommandRequestPayload,
        session: &mut Session,
    ) {
        let request = ChannelRequest::from_payload(&payload, true);
        let ok = self.forward_for_reply(channel, request).await;
        reply(session, channel, ok);
    }
}

/// Answer the request russh is currently dispatching. Sent only if the client asked.
fn reply(session: &mut Session, channel: ChannelId, ok: bool) {
    let _ = if ok {
        session.channel_success(channel)
    } else {
        session.channel_failure(channel)
    };
}

/// Move client bytes from the russh channel into the program's input queue.
/// A full queue holds the channel back rather than losing data. EOF closes the
/// queue; the channel is drained until russh closes it.
async fn pump_client_data(mut channel: Channel<Msg>, data: mpsc::Sender<Vec<u8>>) {
    let mut data = Some(data);
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data: bytes } => {
                let Some(tx) = &data else {
                    continue;
                };
                if tx.send(bytes.to_vec()).await.is_err() {
                    debug!("Program no longer reading input");
                    data = None;
                }
            }
            ChannelMsg::Eof => data = None,
            _ => {}
        }
    }
}

/// Test helper methods for inspecting SshHandler internal state.
/// These are always compiled to allow integration tests in tests/.
impl SshHandler {
    /// Test helper: get current total auth attempts
    pub fn total_auth_attempts(&self) -> u32 {
        self.total_auth_attempts
    }

    /// Test helper: get number of open session channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Test helper: check if session is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.session_state.authenticated
    }

    /// Test helper: get the session username
    pub fn session_username(&self) -> Option<&str> {
        self.session_state.username.as_deref()
    }

    /// Test helper: get the auth method
    pub fn auth_method(&self) -> &str {
        &self.session_state.auth_method
    }

    /// Test helper: get the ssh key fingerprint of the accepted key
    pub fn ssh_key_fingerprint(&self) -> Option<&str> {
        self.session_state.ssh_key_fingerprint.as_deref()
    }

    /// Test helper: get the connection ID
    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// Test helper: get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Test helper: check if a new session channel would be accepted
    pub fn would_accept_new_channel(&self) -> bool {
        self.session_state.authenticated
            && self.channels.len() < self.ctx.config.server.max_channels_per_connection
    }
}

impl Drop for SshHandler {
    fn drop(&mut self) {
        if self.connection_logged {
            self.log_event(LogEntry::ConnectionClose {});
        }
        self.ctx.metrics.record_connection_closed();
        info!(conn_id = %self.conn_id, peer = %self.peer_addr, "Connection closed");
    }
}

fn signal_name(sig: &russh::Sig) -> String {
    match sig {
        russh::Sig::Custom(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

impl russh::server::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        let accepted = self.ctx.config.auth.no_auth;
        self.log_event(LogEntry::NoAuth {
            user: user.to_string(),
            accepted,
        });
        Ok(self.conclude_auth(user, "none", accepted))
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let policy = self.ctx.config.auth.password_auth;
        if !policy.enabled {
            return Ok(self.reject_disabled());
        }
        self.log_event(LogEntry::PasswordAuth {
            user: user.to_string(),
            password: password.to_string(),
            accepted: policy.accepted,
        });
        Ok(self.conclude_auth(user, "password", policy.accepted))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        let policy = self.ctx.config.auth.public_key_auth;
        if !policy.enabled {
            return Ok(self.reject_disabled());
        }
        let fingerprint = public_key
            .fingerprint(russh::keys::HashAlg::Sha256)
            .to_string();
        self.log_event(LogEntry::PublicKeyAuth {
            user: user.to_string(),
            public_key_fingerprint: fingerprint.clone(),
            accepted: policy.accepted,
        });
        let auth = self.conclude_auth(user, "publickey", policy.accepted);
        if policy.accepted {
            self.session_state.ssh_key_fingerprint = Some(fingerprint);
        }
        Ok(auth)
    }

    async fn auth_keyboard_interactive<'a>(
        &'a mut self,
        user: &str,
        _submethods: &str,
        response: Option<Response<'a>>,
    ) -> Result<Auth, Self::Error> {
        if !self.ctx.config.auth.keyboard_interactive_auth.enabled {
            return Ok(self.reject_disabled());
        }
        match response {
            None => Ok(self.keyboard_interactive_challenge()),
            Some(response) => {
                let answers = response
                    .map(|answer| String::from_utf8_lossy(&answer).into_owned())
                    .collect();
                Ok(self.keyboard_interactive_answers(user, answers))
            }
        }
    }

    async fn auth_succeeded(&mut self, session: &mut Session) -> Result<(), Self::Error> {
        self.log_connection(session.remote_sshid());
        Ok(())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let conn = match (&self.conn, self.session_state.authenticated) {
            (Some(conn), true) => conn.clone(),
            _ => return Ok(false),
        };

        let max = self.ctx.config.server.max_channels_per_connection;
        if self.channels.len() >= max {
            warn!(
                conn_id = %self.conn_id,
                user = %conn.user,
                max,
                "Max session channels per connection exceeded"
            );
            return Ok(false);
        }

        let channel_id = self.allocate_channel_id();
        self.log_event(LogEntry::DebugChannel {
            channel_id,
            channel_type: "session".to_string(),
        });

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::channel(CLIENT_DATA_CAPACITY);
        let transport = Arc::new(RusshChannel::spawn(session.handle(), channel.id()));
        self.channels.insert(channel.id(), request_tx);

        let span = info_span!("session", conn_id = %self.conn_id, user = %conn.user, channel = channel_id);
        // Requests arrive through the handler callbacks, data through the channel stream.
        tokio::spawn(pump_client_data(channel, data_tx).instrument(span.clone()));
        tokio::spawn(
            serve_channel(channel_id, conn, transport, data_rx, request_rx).instrument(span),
        );
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let channel_id = self.allocate_channel_id();
        self.log_event(LogEntry::DirectTcpip {
            channel_id,
            from: format!("{}:{}", originator_address, originator_port),
            to: format!("{}:{}", host_to_connect, port_to_connect),
        });
        warn!(
            conn_id = %self.conn_id,
            host = %host_to_connect,
            port = port_to_connect,
            "direct-tcpip channel refused"
        );
        drop(channel);
        Ok(false)
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let modes: Vec<(u8, u32)> = modes.iter().map(|(op, v)| (*op as u8, *v)).collect();
        let payload = CommandRequestPayload::Pty {
            term: term.to_string(),
            width: col_width,
            height: row_height,
            pixel_width: pix_width,
            pixel_height: pix_height,
            modes: encode_terminal_modes(&modes),
        };
        self.forward_and_reply(channel, payload, session).await;
        Ok(())
    }

    async fn x11_request(
        &mut self,
        channel: ChannelId,
        single_connection: bool,
        x11_auth_protocol: &str,
        x11_auth_cookie: &str,
        x11_screen_number: u32,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = CommandRequestPayload::X11 {
            single_connection,
            auth_protocol: x11_auth_protocol.to_string(),
            auth_cookie: x11_auth_cookie.to_string(),
            screen: x11_screen_number,
        };
        self.forward_and_reply(channel, payload, session).await;
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = CommandRequestPayload::Env {
            name: variable_name.to_string(),
            value: variable_value.to_string(),
        };
        self.forward_and_reply(channel, payload, session).await;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward_and_reply(channel, CommandRequestPayload::Shell, session)
            .await;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        // Raw bytes; the command need not be UTF-8.
        let payload = WireWriter::new().bytes(data).finish();
        let ok = self
            .forward_for_reply(channel, ChannelRequest::new(EXEC, true, payload))
            .await;
        reply(session, channel, ok);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = CommandRequestPayload::Subsystem {
            name: name.to_string(),
        };
        self.forward_and_reply(channel, payload, session).await;
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = CommandRequestPayload::WindowChange {
            width: col_width,
            height: row_height,
            pixel_width: pix_width,
            pixel_height: pix_height,
        };
        self.forward(channel, ChannelRequest::from_payload(&payload, false));
        Ok(())
    }

    async fn signal(
        &mut self,
        channel: ChannelId,
        signal: russh::Sig,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = encode_signal(&signal_name(&signal));
        self.forward(channel, ChannelRequest::new(SIGNAL, false, payload));
        Ok(())
    }

    /// russh answers agent forwarding itself from the return value, so the
    /// forwarded copy is marked as not wanting a reply.
    async fn agent_request(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.forward(channel, ChannelRequest::new(AUTH_AGENT_REQ, false, Vec::new()));
        Ok(false)
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.log_event(LogEntry::TcpipForward {
            address: format!("{}:{}", address, port),
        });
        warn!(conn_id = %self.conn_id, address = %address, port = %port, "Reverse forwarding refused");
        Ok(false)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.log_event(LogEntry::CancelTcpipForward {
            address: format!("{}:{}", address, port),
        });
        Ok(false)
    }
}
