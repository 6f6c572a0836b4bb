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

use thiserror::Error;

use crate::types::Channel;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame shorter than the {0}-byte address header")]
    MalformedFrame(usize),
    #[error("type URL `{0}` does not match any known message type")]
    UnknownTypeUrl(String),
    #[error("failed to decode protobuf payload: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no endpoint configured for machine {0}")]
    UnknownMachine(crate::types::MachineId),
    #[error("key `{0}` is not numeric and no other partitioning rule is configured")]
    NonNumericKey(String),
    #[error("replica index {0} out of range (num_replicas = {1})")]
    ReplicaOutOfRange(u16, u16),
    #[error("partition index {0} out of range (num_partitions = {1})")]
    PartitionOutOfRange(u16, u16),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("channel {0} is already bound")]
    ChannelAlreadyBound(Channel),
    #[error("channel {0} is not bound")]
    UnknownChannel(Channel),
    #[error("tag {0} is already redirected")]
    RedirectConflict(u64),
    #[error("tag {0} has no installed redirection")]
    UnknownTag(u64),
    #[error("broker has shut down")]
    BrokerGone,
    #[error(transparent)]
    Zmq(#[from] zmq::Error),
}

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("no route to machine {0}")]
    UnreachableMachine(crate::types::MachineId),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Zmq(#[from] zmq::Error),
    #[error("broker has shut down")]
    BrokerGone,
}

#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Sender(#[from] SenderError),
    #[error("transaction {0} referenced by a lookup response is not pending")]
    UnknownPendingTransaction(u64),
}

/// Crate-level error for callers who don't need to distinguish which layer failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Sender(#[from] SenderError),
    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
}
