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

use serde::{Deserialize, Serialize};

use crate::types::MachineId;

/// The only `partition_of_key` scheme implemented. A second, hash-based mode
/// exists in the original source but is gated behind a config flag no caller
/// of this core exercises; left as a follow-up (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionOfKeyRule {
    /// `key.parse::<u64>()? % num_partitions`.
    Simple,
}

/// Everything a process needs to address itself and its peers.
///
/// `replicas[replica][partition]` is the network endpoint (e.g. `tcp://host:port`)
/// of that machine's broker. Row-major, same layout `MakeMachineId` implies in
/// the original: `replica` selects the row, `partition` the column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub num_partitions: u16,
    pub num_replicas: u16,
    pub local_partition: u16,
    pub local_replica: u16,
    pub partition_of_key_rule: PartitionOfKeyRule,
    pub leader_partition_for_multi_home_ordering: u16,
    pub bypass_mh_orderer: bool,
    pub batch_timeout_ms: u64,
    pub poll_timeout_ms: u64,
    pub default_master_region_for_new_key: u32,
    pub replicas: Vec<Vec<String>>,
}

impl Configuration {
    pub fn local_machine_id(&self) -> MachineId {
        MachineId::new(self.local_replica, self.local_partition)
    }

    /// Builds an in-memory configuration for tests, mirroring
    /// `MakeTestConfigurations` in the original's test utilities: `num_replicas`
    /// single-partition machines at `inproc://` addresses, plus whatever
    /// overrides the caller supplies.
    pub fn for_test(num_replicas: u16, num_partitions: u16, local_replica: u16, local_partition: u16) -> Self {
        let replicas = (0..num_replicas)
            .map(|r| {
                (0..num_partitions)
                    .map(|p| format!("inproc://machine-{}-{}", r, p))
                    .collect()
            })
            .collect();
        Configuration {
            num_partitions,
            num_replicas,
            local_partition,
            local_replica,
            partition_of_key_rule: PartitionOfKeyRule::Simple,
            leader_partition_for_multi_home_ordering: 0,
            bypass_mh_orderer: false,
            batch_timeout_ms: 50,
            poll_timeout_ms: 10,
            default_master_region_for_new_key: 0,
            replicas,
        }
    }
}
