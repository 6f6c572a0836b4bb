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

//! Wire framing: `from_machine_id (4B LE) || to_channel (8B LE) || Any-wrapped Envelope`.
//!
//! The `Any` wrapper (type URL + bytes) mirrors `google::protobuf::Any` in the
//! original `zmq_utils.h`; it lets a receiver reject payloads of an
//! unexpected type before attempting to decode them as an `Envelope`.

use prost::Message;
use prost_types::Any;

use crate::{
    error::CodecError,
    proto::{Envelope, ENVELOPE_TYPE_URL},
    types::{Channel, MachineId},
};

pub const MACHINE_ID_LEN: usize = 4;
pub const CHANNEL_LEN: usize = 8;
pub const HEADER_LEN: usize = MACHINE_ID_LEN + CHANNEL_LEN;

/// Encodes `env` addressed `from -> to` into a single wire frame.
pub fn encode(env: &Envelope, from: MachineId, to: Channel) -> Vec<u8> {
    let any = Any {
        type_url: ENVELOPE_TYPE_URL.to_string(),
        value: env.encode_to_vec(),
    };
    let mut buf = Vec::with_capacity(HEADER_LEN + any.encoded_len());
    buf.extend_from_slice(&from.as_u32().to_le_bytes());
    buf.extend_from_slice(&to.to_le_bytes());
    any.encode(&mut buf).expect("Vec<u8> buffers never overflow prost encoding");
    buf
}

/// Parses only the header, without touching the payload. Used by the broker
/// to make redirection/dispatch decisions before deciding whether a full
/// decode is needed.
pub fn decode_header(frame: &[u8]) -> Result<(MachineId, Channel), CodecError> {
    if frame.len() < HEADER_LEN {
        return Err(CodecError::MalformedFrame(frame.len()));
    }
    let from = u32::from_le_bytes(frame[0..MACHINE_ID_LEN].try_into().unwrap());
    let to = u64::from_le_bytes(frame[MACHINE_ID_LEN..HEADER_LEN].try_into().unwrap());
    Ok((MachineId::from_u32(from), to))
}

/// Parses the header and fully decodes the payload.
pub fn decode(frame: &[u8]) -> Result<(MachineId, Channel, Envelope), CodecError> {
    let (from, to) = decode_header(frame)?;
    let any = Any::decode(&frame[HEADER_LEN..])?;
    if any.type_url != ENVELOPE_TYPE_URL {
        return Err(CodecError::UnknownTypeUrl(any.type_url));
    }
    let env = Envelope::decode(any.value.as_slice())?;
    Ok((from, to, env))
}
