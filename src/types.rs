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

//! Machine and channel addressing.
//!
//! A [`MachineId`] names a single process in the deployment (one partition of
//! one replica); a [`Channel`] names an in-process destination within that
//! process (a module's inbox). Together `(MachineId, Channel)` is the full
//! address any [`Envelope`](crate::proto::Envelope) is sent to.

use std::fmt;

/// Identifies one partition of one replica.
///
/// Packed as `(region_id << 16) | partition_id`, matching the original's
/// `MakeMachineId(replica, partition)` bit layout so the wire format and the
/// endpoint table index the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MachineId(u32);

impl MachineId {
    pub fn new(replica: u16, partition: u16) -> Self {
        MachineId(((replica as u32) << 16) | partition as u32)
    }

    pub fn replica(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn partition(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn from_u32(raw: u32) -> Self {
        MachineId(raw)
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.replica(), self.partition())
    }
}

/// Names an in-process destination. Channel `0` is reserved by the wire
/// protocol for ZMQ's own use and is never handed out by [`Directory`](crate::directory::Directory).
pub type Channel = u64;

pub const BROKER_CHANNEL: Channel = 1;
pub const SEQUENCER_CHANNEL: Channel = 2;
pub const FORWARDER_CHANNEL: Channel = 3;
pub const SCHEDULER_CHANNEL: Channel = 4;
pub const MULTI_HOME_ORDERER_CHANNEL: Channel = 5;

/// Lowest channel number a [`Module`](crate::module::ModuleRuntime) may register for its own
/// private use (redirection tags, ad hoc reply channels, ...).
pub const RESERVED_CHANNEL_WATERMARK: Channel = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_roundtrips_replica_and_partition() {
        let id = MachineId::new(3, 7);
        assert_eq!(id.replica(), 3);
        assert_eq!(id.partition(), 7);
        assert_eq!(MachineId::from_u32(id.as_u32()), id);
    }

    #[test]
    fn machine_id_ordering_is_replica_major() {
        let a = MachineId::new(0, 5);
        let b = MachineId::new(1, 0);
        assert!(a < b);
    }
}
