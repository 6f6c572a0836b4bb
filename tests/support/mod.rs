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

//! Shared fixtures for the end-to-end tests: a couple of minimal [`Module`]
//! impls and helpers for wiring up brokers under test-only addresses.
//!
//! Test channel numbers stay at or above [`slogcoord::types::RESERVED_CHANNEL_WATERMARK`]
//! so they never collide with the five reserved channels the production
//! modules (forwarder, sequencer, ...) bind to.

#![allow(dead_code)]

use std::collections::HashMap;

use slogcoord::{
    config::Configuration,
    connection::{sender::Sender, Broker, BrokerHandle},
    directory::Directory,
    module::{Module, TimerQueue},
    proto::{
        envelope::Body, request::Kind as RequestKind, response::Kind as ResponseKind, EchoMessage, Envelope, ForwardTxn, Request,
        Response, Transaction, TransactionInternal,
    },
    types::{Channel, MachineId},
};

pub const PING: Channel = 10;
pub const PONG: Channel = 11;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds a `replicas` table with one real `tcp://127.0.0.1:<port>` endpoint
/// per `(replica, partition)` pair named in `ports`, sized to the largest
/// replica/partition index given.
pub fn tcp_config(local_replica: u16, local_partition: u16, ports: &[(u16, u16, u16)]) -> Configuration {
    let max_replica = ports.iter().map(|(r, _, _)| *r).max().unwrap_or(0);
    let max_partition = ports.iter().map(|(_, p, _)| *p).max().unwrap_or(0);
    let mut config = Configuration::for_test(max_replica + 1, max_partition + 1, local_replica, local_partition);
    let mut replicas = vec![vec![String::new(); (max_partition + 1) as usize]; (max_replica + 1) as usize];
    for (r, p, port) in ports {
        replicas[*r as usize][*p as usize] = format!("tcp://127.0.0.1:{}", port);
    }
    config.replicas = replicas;
    config
}

/// Starts a broker bound under `config`, on its own fresh context. Two
/// brokers meant to talk over real sockets (as separate processes would)
/// must each get their own context and a `tcp://` endpoint; two meant to
/// share a process can be handed the same context and `inproc://` endpoints.
pub fn start_broker(config: Configuration, ctx: zmq::Context) -> BrokerHandle {
    let directory = Directory::new(config);
    Broker::new(directory, ctx).expect("broker should bind its endpoints").start()
}

pub fn echo_request(data: &str) -> Envelope {
    Envelope {
        from_machine_id: None,
        body: Some(Body::Request(Request {
            kind: Some(RequestKind::Echo(EchoMessage { data: data.to_string() })),
        })),
    }
}

pub fn forward_txn_request(txn: Transaction) -> Envelope {
    Envelope {
        from_machine_id: None,
        body: Some(Body::Request(Request {
            kind: Some(RequestKind::ForwardTxn(ForwardTxn { txn })),
        })),
    }
}

pub fn sample_txn(id: u64, keys: &[&str]) -> Transaction {
    let mut read_set = HashMap::new();
    for k in keys {
        read_set.insert(k.to_string(), String::new());
    }
    Transaction {
        id,
        read_set,
        write_set: Default::default(),
        internal: Some(TransactionInternal::default()),
    }
}

/// Replies to every `Echo` request with a fixed `"pong"` on `reply_channel`,
/// and records every echo it observes (as a request or as a response).
pub struct EchoModule {
    reply_channel: Channel,
    pub received: Vec<(MachineId, String)>,
}

impl EchoModule {
    pub fn new(reply_channel: Channel) -> Self {
        EchoModule {
            reply_channel,
            received: Vec::new(),
        }
    }
}

impl Module for EchoModule {
    fn handle_request(&mut self, from: MachineId, request: Request, sender: &mut Sender, _timers: &mut TimerQueue<Self>) {
        if let Some(RequestKind::Echo(echo)) = request.kind {
            self.received.push((from, echo.data));
            let response = Envelope {
                from_machine_id: None,
                body: Some(Body::Response(Response {
                    kind: Some(ResponseKind::Echo(EchoMessage { data: "pong".to_string() })),
                })),
            };
            let _ = sender.send(&response, from, self.reply_channel);
        }
    }

    fn handle_response(&mut self, from: MachineId, response: Response, _sender: &mut Sender, _timers: &mut TimerQueue<Self>) {
        if let Some(ResponseKind::Echo(echo)) = response.kind {
            self.received.push((from, echo.data));
        }
    }
}

/// Records every `ForwardTxn` request it receives, without acting on it.
/// Stands in for the sequencer/scheduler/multi-home orderer in forwarder
/// dispatch tests.
pub struct CaptureModule {
    pub received: Vec<(MachineId, Transaction)>,
}

impl CaptureModule {
    pub fn new() -> Self {
        CaptureModule { received: Vec::new() }
    }
}

impl Module for CaptureModule {
    fn handle_request(&mut self, from: MachineId, request: Request, _sender: &mut Sender, _timers: &mut TimerQueue<Self>) {
        if let Some(RequestKind::ForwardTxn(ForwardTxn { txn })) = request.kind {
            self.received.push((from, txn));
        }
    }

    fn handle_response(&mut self, _from: MachineId, _response: Response, _sender: &mut Sender, _timers: &mut TimerQueue<Self>) {}
}

/// Calls `step` (expected to tick whatever runtimes are in play and report
/// whether the awaited condition now holds) until it returns `true` or
/// `max_rounds` elapses, sleeping briefly between rounds.
pub fn poll_until(max_rounds: u32, mut step: impl FnMut() -> bool) {
    for _ in 0..max_rounds {
        if step() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}
