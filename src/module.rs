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

//! Minimal cooperative loop behind each channel.
//!
//! Each module runs single-threaded: its state is never shared across
//! threads, and handlers run to completion without suspending. The only
//! suspension point is the poll call inside [`ModuleRuntime::run_once`].

use std::time::{Duration, Instant};

use crate::{
    connection::{broker::BrokerHandle, sender::Sender, zmq_util},
    directory::inproc_channel_address,
    proto::{envelope::Body, Request, Response},
    types::{Channel, MachineId},
};

/// Implemented by the state machine living behind a channel (the forwarder,
/// a sequencer, ...). Handlers receive the originating machine, the decoded
/// request/response, a sender to reply or fan out with, and a timer queue to
/// schedule follow-up work on.
pub trait Module {
    fn handle_request(&mut self, from: MachineId, request: Request, sender: &mut Sender, timers: &mut TimerQueue<Self>)
    where Self: Sized;

    fn handle_response(&mut self, from: MachineId, response: Response, sender: &mut Sender, timers: &mut TimerQueue<Self>)
    where Self: Sized;
}

struct ScheduledCallback<M> {
    deadline: Instant,
    callback: Box<dyn FnOnce(&mut M, &mut Sender) + Send>,
}

/// Holds single-shot callbacks armed by [`TimerQueue::new_timed_callback`]
/// until their deadline elapses.
pub struct TimerQueue<M> {
    callbacks: Vec<ScheduledCallback<M>>,
}

impl<M> TimerQueue<M> {
    fn new() -> Self {
        TimerQueue { callbacks: Vec::new() }
    }

    /// Records a single-shot callback that fires no earlier than `delay` from
    /// now, on this module's own thread.
    pub fn new_timed_callback(&mut self, delay: Duration, callback: impl FnOnce(&mut M, &mut Sender) + Send + 'static) {
        self.callbacks.push(ScheduledCallback {
            deadline: Instant::now() + delay,
            callback: Box::new(callback),
        });
    }

    /// True if at least one callback is armed. The forwarder's batch flush
    /// uses this to implement its single-shot-timer-per-window rule.
    pub fn has_pending(&self) -> bool {
        !self.callbacks.is_empty()
    }

    fn fire_ready(&mut self, module: &mut M, sender: &mut Sender) {
        let now = Instant::now();
        let mut i = 0;
        while i < self.callbacks.len() {
            if self.callbacks[i].deadline <= now {
                let scheduled = self.callbacks.remove(i);
                (scheduled.callback)(module, sender);
            } else {
                i += 1;
            }
        }
    }
}

/// Drives one [`Module`] behind one channel.
pub struct ModuleRuntime<M: Module> {
    module: M,
    channel: Channel,
    socket: zmq::Socket,
    sender: Sender,
    timers: TimerQueue<M>,
    poll_timeout_ms: u64,
    drain_budget: usize,
}

impl<M: Module> ModuleRuntime<M> {
    pub fn new(module: M, channel: Channel, broker: &BrokerHandle) -> Result<Self, crate::error::Error> {
        match broker.add_channel(channel) {
            Ok(()) | Err(crate::error::BrokerError::ChannelAlreadyBound(_)) => {},
            Err(e) => return Err(e.into()),
        }
        let socket = zmq_util::new_socket(broker.context(), zmq::PULL).map_err(crate::error::BrokerError::from)?;
        socket
            .connect(&inproc_channel_address(channel))
            .map_err(crate::error::BrokerError::from)?;
        let sender = Sender::new(broker.weak_shared());
        Ok(ModuleRuntime {
            module,
            channel,
            socket,
            sender,
            timers: TimerQueue::new(),
            poll_timeout_ms: broker.directory().config().poll_timeout_ms,
            drain_budget: 64,
        })
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn sender(&mut self) -> &mut Sender {
        &mut self.sender
    }

    pub fn timers(&mut self) -> &mut TimerQueue<M> {
        &mut self.timers
    }

    /// Drains up to the drain budget without blocking, dispatches each
    /// envelope, then fires any timers whose deadline has elapsed.
    pub fn tick(&mut self) {
        for _ in 0..self.drain_budget {
            let mut items = [self.socket.as_poll_item(zmq::POLLIN)];
            if zmq::poll(&mut items, 0).is_err() {
                break;
            }
            if !items[0].is_readable() {
                break;
            }
            let frame = match self.socket.recv_bytes(0) {
                Ok(f) => f,
                Err(_) => break,
            };
            self.dispatch_channel_frame(&frame);
        }
        self.timers.fire_ready(&mut self.module, &mut self.sender);
    }

    /// Blocks up to `poll_timeout_ms` for the first message, then behaves
    /// like [`ModuleRuntime::tick`]. This is the module's only suspension
    /// point.
    pub fn run_once(&mut self) {
        let mut items = [self.socket.as_poll_item(zmq::POLLIN)];
        let _ = zmq::poll(&mut items, self.poll_timeout_ms as i64);
        self.tick();
    }

    fn dispatch_channel_frame(&mut self, frame: &[u8]) {
        if frame.len() < crate::codec::MACHINE_ID_LEN {
            log::warn!(target: "slogcoord::module", "malformed channel frame on channel {}", self.channel);
            return;
        }
        let from = MachineId::from_u32(u32::from_le_bytes(
            frame[0..crate::codec::MACHINE_ID_LEN].try_into().unwrap(),
        ));
        // Safety: every frame on a channel socket was produced by `Broker::deliver_to_bound_channel`
        // via `zmq_util::send_pointer` in this same process.
        let env = unsafe { zmq_util::recv_pointer(&frame[crate::codec::MACHINE_ID_LEN..]) };
        match env.body {
            Some(Body::Request(r)) => self.module.handle_request(from, r, &mut self.sender, &mut self.timers),
            Some(Body::Response(r)) => self.module.handle_response(from, r, &mut self.sender, &mut self.timers),
            None => log::warn!(target: "slogcoord::module", "empty envelope body on channel {}", self.channel),
        }
    }
}
