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

//! Transport and pre-ordering core of a geo-distributed deterministic
//! transaction coordinator.
//!
//! Three layers, leaf-first:
//!
//! - [`codec`] and [`directory`]: the wire format and the pure endpoint/
//!   partition lookup table.
//! - [`connection`]: the [`connection::Broker`] (one per process, owns the
//!   network socket and the in-process routing fabric) and
//!   [`connection::Sender`] (per-caller façade, lazy outbound sockets).
//! - [`module`] and [`forwarder`]: the cooperative per-channel runtime and
//!   the transaction-routing state machine built on top of it.

pub mod codec;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod forwarder;
pub mod module;
pub mod proto;
pub mod transaction;
pub mod types;

pub use config::Configuration;
pub use connection::{Broker, BrokerHandle, Sender};
pub use directory::Directory;
pub use error::Error;
pub use forwarder::Forwarder;
pub use module::ModuleRuntime;
