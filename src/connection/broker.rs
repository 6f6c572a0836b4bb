//  Copyright 2019 The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! The per-process message hub.
//!
//! A `Broker` owns exactly two zmq sockets: a `PULL` socket bound to this
//! machine's network endpoint (carries serialized traffic from every other
//! process, including this one's own senders dialing their own endpoint) and
//! a `PULL` socket bound to a fixed `inproc://` address (carries pointer-pass
//! traffic from senders in this same process via [`Sender::send_local`]).
//! Which socket a frame arrived on is exactly how the broker tells
//! pointer-pass and serialized frames apart — never by inspecting bytes.
//!
//! Registering a channel (`add_channel`) binds a third kind of socket: a
//! `PUSH` socket at `inproc://channel-<c>` that the broker delivers resolved
//! messages to, and that a [`crate::module::ModuleRuntime`] connects a `PULL`
//! socket to in order to read its inbox.

use std::{
    collections::{HashMap, VecDeque},
    sync::{mpsc, Arc, Weak},
    thread,
};

use crate::{
    connection::{context::TransportContext, zmq_util},
    directory::{inproc_channel_address, Directory},
    error::BrokerError,
    proto::{envelope::Body, request::Kind as RequestKind, BrokerRedirect, Envelope, Request},
    types::{Channel, MachineId, BROKER_CHANNEL, RESERVED_CHANNEL_WATERMARK},
};

const LOCAL_INGRESS_ADDRESS: &str = "inproc://broker-local-ingress";

struct PendingMessage {
    from: MachineId,
    env: Envelope,
}

enum AdminCommand {
    AddChannel {
        channel: Channel,
        reply: mpsc::Sender<Result<(), BrokerError>>,
    },
    Install {
        tag: Channel,
        channel: Channel,
        reply: mpsc::Sender<Result<(), BrokerError>>,
    },
    Remove {
        tag: Channel,
        reply: mpsc::Sender<Result<(), BrokerError>>,
    },
    Shutdown,
}

/// State shared between every [`BrokerHandle`] clone and every [`Sender`](crate::connection::sender::Sender)
/// created against this broker. Senders hold only a [`Weak`] reference to
/// this; once the last `BrokerHandle` (and the broker thread with it) is
/// dropped, senders degrade to no-ops instead of panicking.
pub(crate) struct BrokerShared {
    pub(crate) directory: Directory,
    pub(crate) ctx: TransportContext,
}

/// A handle to a running broker. Cheap to clone; every clone can call the
/// admin API from any thread.
#[derive(Clone)]
pub struct BrokerHandle {
    shared: Arc<BrokerShared>,
    admin_tx: mpsc::Sender<AdminCommand>,
}

impl BrokerHandle {
    pub fn directory(&self) -> &Directory {
        &self.shared.directory
    }

    pub fn context(&self) -> &TransportContext {
        &self.shared.ctx
    }

    pub(crate) fn weak_shared(&self) -> Weak<BrokerShared> {
        Arc::downgrade(&self.shared)
    }

    /// A standalone `Sender` against this broker, for callers that aren't
    /// themselves a [`Module`](crate::module::Module) behind a channel (e.g.
    /// a client submitting requests from outside the cooperative runtime).
    pub fn new_sender(&self) -> crate::connection::sender::Sender {
        crate::connection::sender::Sender::new(self.weak_shared())
    }

    /// Binds a new in-process receive endpoint for `channel`. Idempotent:
    /// calling it twice for the same channel fails with `ChannelAlreadyBound`.
    pub fn add_channel(&self, channel: Channel) -> Result<(), BrokerError> {
        self.call(|reply| AdminCommand::AddChannel { channel, reply })
    }

    /// Installs `tag -> channel`. Fails with `RedirectConflict` if `tag`
    /// already resolves to a different channel.
    pub fn install(&self, tag: Channel, channel: Channel) -> Result<(), BrokerError> {
        self.call(|reply| AdminCommand::Install { tag, channel, reply })
    }

    /// Removes any binding for `tag`. Future messages to `tag` are queued
    /// again until the next `install`.
    pub fn remove(&self, tag: Channel) -> Result<(), BrokerError> {
        self.call(|reply| AdminCommand::Remove { tag, reply })
    }

    pub fn shutdown(&self) {
        let _ = self.admin_tx.send(AdminCommand::Shutdown);
    }

    fn call(&self, make_cmd: impl FnOnce(mpsc::Sender<Result<(), BrokerError>>) -> AdminCommand) -> Result<(), BrokerError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.admin_tx.send(make_cmd(reply_tx)).map_err(|_| BrokerError::BrokerGone)?;
        reply_rx.recv().map_err(|_| BrokerError::BrokerGone)?
    }
}

/// An unstarted broker: sockets are bound eagerly in [`Broker::new`] so that
/// [`Broker::start`] can return only once the inbound socket is live.
pub struct Broker {
    shared: Arc<BrokerShared>,
    network_socket: zmq::Socket,
    local_ingress_socket: zmq::Socket,
    channels: HashMap<Channel, zmq::Socket>,
    redirects: HashMap<Channel, Channel>,
    pending: HashMap<Channel, VecDeque<PendingMessage>>,
    admin_rx: mpsc::Receiver<AdminCommand>,
    admin_tx: mpsc::Sender<AdminCommand>,
    poll_timeout_ms: u64,
}

impl Broker {
    pub fn new(directory: Directory, ctx: TransportContext) -> Result<Self, BrokerError> {
        let network_socket = zmq_util::new_socket(&ctx, zmq::PULL)?;
        let endpoint = directory.endpoint_of(directory.local_machine_id())?.to_string();
        network_socket.bind(&endpoint)?;

        let local_ingress_socket = zmq_util::new_socket(&ctx, zmq::PULL)?;
        local_ingress_socket.bind(LOCAL_INGRESS_ADDRESS)?;

        let poll_timeout_ms = directory.config().poll_timeout_ms;
        let (admin_tx, admin_rx) = mpsc::channel();

        Ok(Broker {
            shared: Arc::new(BrokerShared { directory, ctx }),
            network_socket,
            local_ingress_socket,
            channels: HashMap::new(),
            redirects: HashMap::new(),
            pending: HashMap::new(),
            admin_rx,
            admin_tx,
            poll_timeout_ms,
        })
    }

    /// Spawns the broker thread and returns a handle to it. The inbound
    /// sockets are already bound by the time this returns (they were bound in
    /// [`Broker::new`]).
    pub fn start(self) -> BrokerHandle {
        let handle = BrokerHandle {
            shared: Arc::clone(&self.shared),
            admin_tx: self.admin_tx.clone(),
        };
        thread::spawn(move || self.run());
        handle
    }

    fn is_tag(&self, channel: Channel) -> bool {
        channel >= RESERVED_CHANNEL_WATERMARK && !self.channels.contains_key(&channel)
    }

    fn handle_add_channel(&mut self, channel: Channel) -> Result<(), BrokerError> {
        if self.channels.contains_key(&channel) {
            return Err(BrokerError::ChannelAlreadyBound(channel));
        }
        let socket = zmq_util::new_socket(&self.shared.ctx, zmq::PUSH)?;
        socket.bind(&inproc_channel_address(channel))?;
        self.channels.insert(channel, socket);
        Ok(())
    }

    fn handle_install(&mut self, tag: Channel, channel: Channel) -> Result<(), BrokerError> {
        if let Some(&existing) = self.redirects.get(&tag) {
            if existing != channel {
                return Err(BrokerError::RedirectConflict(tag));
            }
            return Ok(());
        }
        self.redirects.insert(tag, channel);
        if let Some(queue) = self.pending.remove(&tag) {
            for msg in queue {
                self.deliver_to_bound_channel(channel, msg);
            }
        }
        Ok(())
    }

    fn handle_remove(&mut self, tag: Channel) -> Result<(), BrokerError> {
        self.redirects.remove(&tag);
        Ok(())
    }

    fn deliver_to_bound_channel(&self, channel: Channel, msg: PendingMessage) {
        let Some(socket) = self.channels.get(&channel) else {
            log::warn!(target: "slogcoord::broker", "dropping message for unbound channel {}", channel);
            return;
        };
        let pointer = zmq_util::send_pointer(msg.env);
        let mut frame = Vec::with_capacity(crate::codec::MACHINE_ID_LEN + zmq_util::POINTER_MESSAGE_LEN);
        frame.extend_from_slice(&msg.from.as_u32().to_le_bytes());
        frame.extend_from_slice(&pointer);
        if let Err(e) = socket.send(frame, 0) {
            log::error!(target: "slogcoord::broker", "failed to deliver to channel {}: {}", channel, e);
        }
    }

    fn dispatch(&mut self, from: MachineId, to: Channel, mut env: Envelope) {
        env.from_machine_id = Some(from.as_u32());
        let target = self.redirects.get(&to).copied().unwrap_or(to);

        if target == BROKER_CHANNEL {
            self.handle_control_envelope(env);
            return;
        }
        if self.channels.contains_key(&target) {
            self.deliver_to_bound_channel(target, PendingMessage { from, env });
        } else if self.is_tag(to) {
            self.pending.entry(to).or_default().push_back(PendingMessage { from, env });
        } else {
            log::warn!(target: "slogcoord::broker", "dropping message for unknown channel {}", to);
        }
    }

    fn handle_control_envelope(&mut self, env: Envelope) {
        let redirect = match env.body {
            Some(Body::Request(Request {
                kind: Some(RequestKind::BrokerRedirect(BrokerRedirect { tag, channel, stop })),
            })) => (tag, channel, stop),
            _ => {
                log::warn!(target: "slogcoord::broker", "non-BrokerRedirect envelope addressed to the control channel, dropping");
                return;
            },
        };
        let (tag, channel, stop) = redirect;
        let result = if stop {
            self.handle_remove(tag)
        } else {
            self.handle_install(tag, channel)
        };
        if let Err(e) = result {
            log::warn!(target: "slogcoord::broker", "remote redirect request failed: {}", e);
        }
    }

    fn handle_serialized_frame(&mut self, frame: &[u8]) {
        match crate::codec::decode(frame) {
            Ok((from, to, env)) => self.dispatch(from, to, env),
            Err(e) => log::warn!(target: "slogcoord::broker", "malformed frame on network socket: {}", e),
        }
    }

    fn handle_pointer_frame(&mut self, frame: &[u8]) {
        match crate::codec::decode_header(frame) {
            Ok((from, to)) => {
                // Safety: every frame on the local-ingress socket was produced by
                // `Sender::send_local` in this same process via `zmq_util::send_pointer`.
                let env = unsafe { zmq_util::recv_pointer(&frame[crate::codec::HEADER_LEN..]) };
                self.dispatch(from, to, env);
            },
            Err(e) => log::warn!(target: "slogcoord::broker", "malformed frame on local ingress socket: {}", e),
        }
    }

    fn drain_admin_commands(&mut self) -> bool {
        while let Ok(cmd) = self.admin_rx.try_recv() {
            match cmd {
                AdminCommand::AddChannel { channel, reply } => {
                    let _ = reply.send(self.handle_add_channel(channel));
                },
                AdminCommand::Install { tag, channel, reply } => {
                    let _ = reply.send(self.handle_install(tag, channel));
                },
                AdminCommand::Remove { tag, reply } => {
                    let _ = reply.send(self.handle_remove(tag));
                },
                AdminCommand::Shutdown => return false,
            }
        }
        true
    }

    fn run(mut self) {
        loop {
            if !self.drain_admin_commands() {
                log::debug!(target: "slogcoord::broker", "shutting down");
                return;
            }

            let mut items = [
                self.network_socket.as_poll_item(zmq::POLLIN),
                self.local_ingress_socket.as_poll_item(zmq::POLLIN),
            ];
            match zmq::poll(&mut items, self.poll_timeout_ms as i64) {
                Ok(_) => {},
                Err(e) => {
                    log::error!(target: "slogcoord::broker", "fatal poll error, terminating: {}", e);
                    return;
                },
            }

            if items[0].is_readable() {
                if let Ok(frame) = self.network_socket.recv_bytes(0) {
                    self.handle_serialized_frame(&frame);
                }
            }
            if items[1].is_readable() {
                if let Ok(frame) = self.local_ingress_socket.recv_bytes(0) {
                    self.handle_pointer_frame(&frame);
                }
            }
        }
    }
}
