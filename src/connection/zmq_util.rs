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

//! Low-level socket helpers: creating sockets with the right options, and the
//! pointer-pass wire format used for same-process envelope delivery.
//!
//! The broker tells pointer-passed messages apart from serialized ones by
//! *which socket delivered them* (see [`crate::connection::broker`]), never
//! by inspecting the bytes; a pointer-pass frame is simply a raw pointer
//! value reinterpreted as an 8-byte zmq message.

use std::mem;

use crate::proto::Envelope;

/// Size in bytes of a pointer-pass message: one machine word.
pub const POINTER_MESSAGE_LEN: usize = mem::size_of::<usize>();

/// Creates a `PUSH` or `PULL` socket with the send high-water-mark unbounded,
/// matching `zmq_utils.h`'s `sndhwm = 0` convention so a sender never blocks
/// on a slow peer.
pub fn new_socket(ctx: &zmq::Context, kind: zmq::SocketType) -> Result<zmq::Socket, zmq::Error> {
    let socket = ctx.socket(kind)?;
    socket.set_sndhwm(0)?;
    socket.set_rcvhwm(0)?;
    socket.set_linger(0)?;
    Ok(socket)
}

/// Leaks `env` onto the heap and encodes its address as an 8-byte message.
/// Ownership transfers to whoever calls [`recv_pointer`] on the other end;
/// failing to do so leaks the envelope.
pub fn send_pointer(env: Envelope) -> [u8; POINTER_MESSAGE_LEN] {
    let raw = Box::into_raw(Box::new(env)) as usize;
    raw.to_ne_bytes()
}

/// Reclaims an `Envelope` previously handed off by [`send_pointer`].
///
/// # Safety
/// `bytes` must be exactly the output of a prior [`send_pointer`] call that
/// has not already been reclaimed, and must not have crossed a process
/// boundary (the pointer is only valid within the process that created it).
pub unsafe fn recv_pointer(bytes: &[u8]) -> Envelope {
    let mut raw = [0u8; POINTER_MESSAGE_LEN];
    raw.copy_from_slice(bytes);
    let ptr = usize::from_ne_bytes(raw) as *mut Envelope;
    *Box::from_raw(ptr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{envelope::Body, EchoMessage, Request};

    #[test]
    fn pointer_pass_round_trips_without_copying_the_payload() {
        let env = Envelope {
            from_machine_id: None,
            body: Some(Body::Request(Request {
                kind: Some(crate::proto::request::Kind::Echo(EchoMessage {
                    data: "ping".to_string(),
                })),
            })),
        };
        let original = env.clone();
        let bytes = send_pointer(env);
        let recovered = unsafe { recv_pointer(&bytes) };
        assert_eq!(recovered, original);
    }
}
