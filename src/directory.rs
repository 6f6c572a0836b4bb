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

//! Pure lookup table from [`MachineId`] to network endpoint, plus the
//! partitioning rule the forwarder uses to route keys.

use crate::{
    config::{Configuration, PartitionOfKeyRule},
    error::DirectoryError,
    types::{Channel, MachineId},
};

/// The in-process channel address an intra-process `Sender` pushes to.
/// Mirrors `MakeInProcChannelAddress` in the original.
pub fn inproc_channel_address(channel: Channel) -> String {
    format!("inproc://channel-{}", channel)
}

pub struct Directory {
    config: Configuration,
}

impl Directory {
    pub fn new(config: Configuration) -> Self {
        Directory { config }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn local_machine_id(&self) -> MachineId {
        self.config.local_machine_id()
    }

    pub fn local_region(&self) -> u16 {
        self.config.local_replica
    }

    pub fn local_partition(&self) -> u16 {
        self.config.local_partition
    }

    pub fn num_partitions(&self) -> u16 {
        self.config.num_partitions
    }

    pub fn num_replicas(&self) -> u16 {
        self.config.num_replicas
    }

    /// Looks up the network endpoint for `machine_id`.
    pub fn endpoint_of(&self, machine_id: MachineId) -> Result<&str, DirectoryError> {
        self.config
            .replicas
            .get(machine_id.replica() as usize)
            .and_then(|row| row.get(machine_id.partition() as usize))
            .map(String::as_str)
            .ok_or(DirectoryError::UnknownMachine(machine_id))
    }

    /// Routes `key` to a partition id under the configured
    /// [`PartitionOfKeyRule`].
    pub fn partition_of_key(&self, key: &str) -> Result<u16, DirectoryError> {
        match self.config.partition_of_key_rule {
            PartitionOfKeyRule::Simple => {
                let numeric: u64 = key
                    .parse()
                    .map_err(|_| DirectoryError::NonNumericKey(key.to_string()))?;
                Ok((numeric % self.config.num_partitions as u64) as u16)
            },
        }
    }

    pub fn key_is_in_local_partition(&self, key: &str) -> Result<bool, DirectoryError> {
        Ok(self.partition_of_key(key)? == self.local_partition())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Directory {
        Directory::new(Configuration::for_test(2, 3, 0, 1))
    }

    #[test]
    fn endpoint_of_resolves_configured_machine() {
        let dir = directory();
        let endpoint = dir.endpoint_of(MachineId::new(1, 2)).unwrap();
        assert_eq!(endpoint, "inproc://machine-1-2");
    }

    #[test]
    fn endpoint_of_unknown_machine_is_an_error() {
        let dir = directory();
        let err = dir.endpoint_of(MachineId::new(9, 9)).unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownMachine(_)));
    }

    #[test]
    fn partition_of_key_is_modulo_numeric() {
        let dir = directory();
        assert_eq!(dir.partition_of_key("7").unwrap(), 1);
    }

    #[test]
    fn partition_of_key_rejects_non_numeric() {
        let dir = directory();
        let err = dir.partition_of_key("abc").unwrap_err();
        assert!(matches!(err, DirectoryError::NonNumericKey(_)));
    }

    #[test]
    fn key_is_in_local_partition_matches_configured_partition() {
        let dir = directory();
        assert!(dir.key_is_in_local_partition("1").unwrap());
        assert!(!dir.key_is_in_local_partition("2").unwrap());
    }
}
