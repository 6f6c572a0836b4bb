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

//! Per-caller façade for emitting envelopes.
//!
//! A `Sender` caches one `PUSH` socket per destination machine (connected to
//! that machine's network endpoint — even the local machine's, so `send`
//! behaves identically regardless of destination) plus a single `PUSH` socket
//! to the owning broker's local-ingress address, used only by
//! [`Sender::send_local`]'s pointer-pass fast path.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Weak,
    },
};

use crate::{
    codec,
    connection::{
        broker::BrokerShared,
        zmq_util::{self, POINTER_MESSAGE_LEN},
    },
    error::SenderError,
    proto::Envelope,
    types::{Channel, MachineId},
};

const LOCAL_INGRESS_ADDRESS: &str = "inproc://broker-local-ingress";

/// ZMQ identity `0` is reserved by the library itself; the original reserves
/// it and starts assigning sender identities from `1`.
static NEXT_SENDER_ID: AtomicU64 = AtomicU64::new(1);

pub struct Sender {
    id: u64,
    broker: Weak<BrokerShared>,
    machine_sockets: HashMap<MachineId, zmq::Socket>,
    local_ingress_socket: Option<zmq::Socket>,
}

impl Sender {
    pub fn new(broker: Weak<BrokerShared>) -> Self {
        Sender {
            id: NEXT_SENDER_ID.fetch_add(1, Ordering::Relaxed),
            broker,
            machine_sockets: HashMap::new(),
            local_ingress_socket: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn shared(&self) -> Result<std::sync::Arc<BrokerShared>, SenderError> {
        self.broker.upgrade().ok_or(SenderError::BrokerGone)
    }

    fn socket_for_machine(&mut self, shared: &BrokerShared, machine: MachineId) -> Result<&zmq::Socket, SenderError> {
        if !self.machine_sockets.contains_key(&machine) {
            let endpoint = shared.directory.endpoint_of(machine)?.to_string();
            let socket = zmq_util::new_socket(&shared.ctx, zmq::PUSH)?;
            socket.connect(&endpoint)?;
            self.machine_sockets.insert(machine, socket);
        }
        Ok(self.machine_sockets.get(&machine).expect("just inserted"))
    }

    fn local_ingress_socket(&mut self, shared: &BrokerShared) -> Result<&zmq::Socket, SenderError> {
        if self.local_ingress_socket.is_none() {
            let socket = zmq_util::new_socket(&shared.ctx, zmq::PUSH)?;
            socket.connect(LOCAL_INGRESS_ADDRESS)?;
            self.local_ingress_socket = Some(socket);
        }
        Ok(self.local_ingress_socket.as_ref().expect("just inserted"))
    }

    /// Serializes `env` once and pushes it to `to_machine`'s network endpoint,
    /// addressed `(local_machine_id, to_channel)`.
    pub fn send(&mut self, env: &Envelope, to_machine: MachineId, to_channel: Channel) -> Result<(), SenderError> {
        let shared = self.shared()?;
        let from = shared.directory.local_machine_id();
        let frame = codec::encode(env, from, to_channel);
        let socket = self.socket_for_machine(&shared, to_machine)?;
        socket.send(frame, 0)?;
        Ok(())
    }

    /// Serializes `env` once and pushes an independent copy of the bytes to
    /// every machine in `to_machines`, in order.
    pub fn multi_send(&mut self, env: &Envelope, to_machines: &[MachineId], to_channel: Channel) -> Result<(), SenderError> {
        let shared = self.shared()?;
        let from = shared.directory.local_machine_id();
        let frame = codec::encode(env, from, to_channel);
        for &machine in to_machines {
            let socket = self.socket_for_machine(&shared, machine)?;
            socket.send(frame.clone(), 0)?;
        }
        Ok(())
    }

    /// Pointer-pass: hands `env` to the local broker without serializing it.
    /// Only valid for destinations in this same process.
    pub fn send_local(&mut self, env: Envelope, to_channel: Channel) -> Result<(), SenderError> {
        let shared = self.shared()?;
        let from = shared.directory.local_machine_id();
        let pointer = zmq_util::send_pointer(env);
        let mut frame = Vec::with_capacity(codec::HEADER_LEN + POINTER_MESSAGE_LEN);
        frame.extend_from_slice(&from.as_u32().to_le_bytes());
        frame.extend_from_slice(&to_channel.to_le_bytes());
        frame.extend_from_slice(&pointer);
        let socket = self.local_ingress_socket(&shared)?;
        socket.send(frame, 0)?;
        Ok(())
    }
}
