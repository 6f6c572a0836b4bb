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

//! The forwarder's read-only view of locally-mastered keys.
//!
//! Not in core scope (the collaborator contract in the spec this core
//! implements names it as external); this module provides the trait the
//! forwarder is written against plus an in-memory implementation for tests
//! and small deployments.

use std::collections::HashMap;

use crate::proto::Metadata;

/// Read-only, safe for concurrent readers (writers, where they exist, are
/// not this core's concern — they coordinate through the scheduler).
pub trait LookupMasterIndex: Send {
    /// Returns the master metadata for `key`, or `None` if this partition has
    /// never seen it (the caller synthesizes a default in that case).
    fn get_master_metadata(&self, key: &str) -> Option<Metadata>;
}

#[derive(Default)]
pub struct InMemoryLookupMasterIndex {
    entries: HashMap<String, Metadata>,
}

impl InMemoryLookupMasterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, metadata: Metadata) {
        self.entries.insert(key.into(), metadata);
    }
}

impl LookupMasterIndex for InMemoryLookupMasterIndex {
    fn get_master_metadata(&self, key: &str) -> Option<Metadata> {
        self.entries.get(key).cloned()
    }
}
