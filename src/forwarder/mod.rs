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

//! The transaction-routing state machine: master-metadata lookup, home
//! determination, and dispatch to the next stage.

pub mod lookup_master_index;

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    connection::sender::Sender,
    directory::Directory,
    module::{Module, TimerQueue},
    proto::{
        envelope::Body, request::Kind as RequestKind, response::Kind as ResponseKind, Envelope, ForwardTxn, LookupMasterRequest,
        LookupMasterResponse, Metadata, Request, Response, Transaction, TransactionType,
    },
    transaction,
    types::{MachineId, FORWARDER_CHANNEL, MULTI_HOME_ORDERER_CHANNEL, SCHEDULER_CHANNEL, SEQUENCER_CHANNEL},
};
pub use lookup_master_index::{InMemoryLookupMasterIndex, LookupMasterIndex};

type TxnId = transaction::TxnId;

#[derive(Default)]
struct PartitionBatch {
    keys: Vec<String>,
    txn_ids: Vec<TxnId>,
}

pub struct Forwarder {
    directory: Directory,
    lookup_index: Box<dyn LookupMasterIndex>,
    pending_transactions: std::collections::HashMap<TxnId, Transaction>,
    partitioned_lookup_buffer: std::collections::HashMap<u16, PartitionBatch>,
    flush_scheduled: bool,
    rng: StdRng,
}

impl Forwarder {
    pub fn new(directory: Directory, lookup_index: impl LookupMasterIndex + 'static) -> Self {
        Forwarder {
            directory,
            lookup_index: Box::new(lookup_index),
            pending_transactions: std::collections::HashMap::new(),
            partitioned_lookup_buffer: std::collections::HashMap::new(),
            flush_scheduled: false,
            rng: StdRng::from_entropy(),
        }
    }

    fn local_region(&self) -> u32 {
        self.directory.local_region() as u32
    }

    fn choose_random_partition(&mut self, txn: &Transaction) -> u16 {
        let partitions = &txn
            .internal
            .as_ref()
            .expect("dedup_involved_partitions always sets internal")
            .involved_partitions;
        debug_assert!(!partitions.is_empty(), "a valid transaction has at least one key");
        let idx = self.rng.gen_range(0..partitions.len());
        partitions[idx] as u16
    }

    /// Entry point for `ForwardTxn` requests from a local client.
    /// Classifies every key of `txn` as local or remote, filling in local
    /// master metadata and queuing remote keys into the partitioned lookup
    /// buffer. Returns `Ok(true)` if at least one key needs a remote lookup.
    /// Pure bookkeeping: does not touch the network.
    fn classify_keys(&mut self, txn: &mut Transaction) -> Result<bool, crate::error::DirectoryError> {
        let keys: Vec<String> = transaction::all_keys(txn).cloned().collect();
        let local_partition = self.directory.local_partition();
        let mut need_remote_lookup = false;

        for key in &keys {
            let partition = self.directory.partition_of_key(key)?;
            let internal = txn.internal.get_or_insert_with(Default::default);
            internal.involved_partitions.push(partition as u32);

            if partition == local_partition {
                let metadata = self.lookup_index.get_master_metadata(key).unwrap_or(Metadata {
                    master_region: self.directory.config().default_master_region_for_new_key,
                    counter: 0,
                });
                internal.master_metadata.insert(key.clone(), metadata);
            } else {
                need_remote_lookup = true;
                let batch = self.partitioned_lookup_buffer.entry(partition).or_default();
                batch.keys.push(key.clone());
                if !batch.txn_ids.contains(&txn.id) {
                    batch.txn_ids.push(txn.id);
                }
            }
        }

        transaction::dedup_involved_partitions(txn);
        Ok(need_remote_lookup)
    }

    pub fn process_forward_txn(&mut self, mut txn: Transaction, sender: &mut Sender, timers: &mut TimerQueue<Self>) {
        log::trace!(target: "slogcoord::forwarder", "ENTER_FORWARDER txn={}", txn.id);

        let need_remote_lookup = match self.classify_keys(&mut txn) {
            Ok(need) => need,
            Err(e) => {
                log::warn!(target: "slogcoord::forwarder", "dropping txn {}: {}", txn.id, e);
                return;
            },
        };

        if !need_remote_lookup {
            self.classify_and_dispatch(txn, sender);
            return;
        }

        let txn_id = txn.id;
        self.pending_transactions.insert(txn_id, txn);
        if !self.flush_scheduled {
            self.flush_scheduled = true;
            let timeout = Duration::from_millis(self.directory.config().batch_timeout_ms);
            timers.new_timed_callback(timeout, |forwarder: &mut Forwarder, sender: &mut Sender| {
                forwarder.flush_lookup_batches(sender);
            });
        }
    }

    fn flush_lookup_batches(&mut self, sender: &mut Sender) {
        let local_region = self.local_region() as u16;
        for (partition, batch) in self.partitioned_lookup_buffer.drain() {
            if batch.keys.is_empty() {
                continue;
            }
            let request = LookupMasterRequest {
                keys: batch.keys,
                txn_ids: batch.txn_ids,
            };
            let env = Envelope {
                from_machine_id: None,
                body: Some(Body::Request(Request {
                    kind: Some(RequestKind::LookupMaster(request)),
                })),
            };
            let machine = MachineId::new(local_region, partition);
            if let Err(e) = sender.send(&env, machine, FORWARDER_CHANNEL) {
                log::warn!(target: "slogcoord::forwarder", "failed to send lookup batch to partition {}: {}", partition, e);
            }
        }
        self.flush_scheduled = false;
    }

    /// Peer-role handling of an incoming `LookupMaster` request: answer with
    /// whatever of the requested keys this partition masters.
    pub fn handle_lookup_master_request(&mut self, from: MachineId, request: LookupMasterRequest, sender: &mut Sender) {
        let mut master_metadata = std::collections::HashMap::new();
        for key in &request.keys {
            match self.directory.key_is_in_local_partition(key) {
                Ok(true) => {
                    let metadata = self.lookup_index.get_master_metadata(key).unwrap_or(Metadata {
                        master_region: self.directory.config().default_master_region_for_new_key,
                        counter: 0,
                    });
                    master_metadata.insert(key.clone(), metadata);
                },
                _ => continue,
            }
        }
        let response = Response {
            kind: Some(ResponseKind::LookupMaster(LookupMasterResponse {
                txn_ids: request.txn_ids,
                master_metadata,
            })),
        };
        let env = Envelope {
            from_machine_id: None,
            body: Some(Body::Response(response)),
        };
        if let Err(e) = sender.send(&env, from, FORWARDER_CHANNEL) {
            log::warn!(target: "slogcoord::forwarder", "failed to reply to lookup request from {}: {}", from, e);
        }
    }

    /// Handles a `LookupMaster` response: complete whichever pending
    /// transactions it covers, dispatching those whose metadata is now whole.
    pub fn handle_lookup_master_response(&mut self, response: LookupMasterResponse, sender: &mut Sender) {
        for txn_id in response.txn_ids {
            let Some(txn) = self.pending_transactions.get_mut(&txn_id) else {
                log::trace!(target: "slogcoord::forwarder", "lookup response for unknown pending txn {}", txn_id);
                continue;
            };
            let keys_of_interest: Vec<String> = transaction::all_keys(txn).cloned().collect();
            let internal = txn.internal.get_or_insert_with(Default::default);
            for key in &keys_of_interest {
                if let Some(metadata) = response.master_metadata.get(key) {
                    internal.master_metadata.insert(key.clone(), metadata.clone());
                }
            }
            if transaction::is_metadata_complete(txn) {
                let txn = self.pending_transactions.remove(&txn_id).expect("just looked up");
                self.classify_and_dispatch(txn, sender);
            }
        }
    }

    fn classify_and_dispatch(&mut self, mut txn: Transaction, sender: &mut Sender) {
        let class = transaction::classify(&txn);
        txn.internal.get_or_insert_with(Default::default).r#type = class as i32;
        match class {
            TransactionType::SingleHome => self.dispatch_single_home(txn, sender),
            TransactionType::MultiHome => self.dispatch_multi_home(txn, sender),
            TransactionType::Unknown => {
                log::error!(target: "slogcoord::forwarder", "classify_and_dispatch called on incomplete txn {}", txn.id);
            },
        }
    }

    fn dispatch_single_home(&mut self, txn: Transaction, sender: &mut Sender) {
        let home_region = *transaction::involved_masters(&txn)
            .iter()
            .next()
            .expect("SINGLE_HOME implies at least one master");
        log::trace!(target: "slogcoord::forwarder", "EXIT_FORWARDER_TO_SEQUENCER home_region={}", home_region);
        if home_region == self.local_region() {
            let env = forward_txn_envelope(txn);
            if let Err(e) = sender.send_local(env, SEQUENCER_CHANNEL) {
                log::warn!(target: "slogcoord::forwarder", "failed to dispatch to local sequencer: {}", e);
            }
        } else {
            let partition = self.choose_random_partition(&txn);
            let machine = MachineId::new(home_region as u16, partition);
            let env = forward_txn_envelope(txn);
            if let Err(e) = sender.send(&env, machine, SEQUENCER_CHANNEL) {
                log::warn!(target: "slogcoord::forwarder", "failed to dispatch to remote sequencer {}: {}", machine, e);
            }
        }
    }

    fn dispatch_multi_home(&mut self, mut txn: Transaction, sender: &mut Sender) {
        let masters = transaction::involved_masters(&txn);
        txn.internal.get_or_insert_with(Default::default).involved_replicas = masters.iter().copied().collect();
        let involved_partitions = txn.internal.as_ref().unwrap().involved_partitions.clone();
        let bypass = self.directory.config().bypass_mh_orderer;
        log::trace!(target: "slogcoord::forwarder", "EXIT_FORWARDER_TO_MULTI_HOME bypass={}", bypass);

        if bypass {
            let partition = self.choose_random_partition(&txn);
            let env = forward_txn_envelope(txn);

            let sequencer_destinations: Vec<MachineId> =
                masters.iter().map(|&replica| MachineId::new(replica as u16, partition)).collect();
            if let Err(e) = sender.multi_send(&env, &sequencer_destinations, SEQUENCER_CHANNEL) {
                log::warn!(target: "slogcoord::forwarder", "failed to dispatch to sequencers: {}", e);
            }

            // Every replica in the cluster runs a Scheduler for every involved
            // partition, not just the masters' replicas: the Scheduler's job
            // is to order this transaction against the rest of its replica's
            // log, which every replica does regardless of who masters a key.
            let scheduler_destinations: Vec<MachineId> = (0..self.directory.num_replicas())
                .flat_map(|replica| involved_partitions.iter().map(move |&partition| MachineId::new(replica, partition as u16)))
                .collect();
            if let Err(e) = sender.multi_send(&env, &scheduler_destinations, SCHEDULER_CHANNEL) {
                log::warn!(target: "slogcoord::forwarder", "failed to dispatch to schedulers: {}", e);
            }
        } else {
            let leader_partition = self.directory.config().leader_partition_for_multi_home_ordering;
            let machine = MachineId::new(self.local_region() as u16, leader_partition);
            let env = forward_txn_envelope(txn);
            if let Err(e) = sender.send(&env, machine, MULTI_HOME_ORDERER_CHANNEL) {
                log::warn!(target: "slogcoord::forwarder", "failed to dispatch to multi-home orderer {}: {}", machine, e);
            }
        }
    }
}

fn forward_txn_envelope(txn: Transaction) -> Envelope {
    Envelope {
        from_machine_id: None,
        body: Some(Body::Request(Request {
            kind: Some(RequestKind::ForwardTxn(ForwardTxn { txn })),
        })),
    }
}

impl Module for Forwarder {
    fn handle_request(&mut self, from: MachineId, request: Request, sender: &mut Sender, timers: &mut TimerQueue<Self>) {
        match request.kind {
            Some(RequestKind::ForwardTxn(ForwardTxn { txn })) => self.process_forward_txn(txn, sender, timers),
            Some(RequestKind::LookupMaster(req)) => self.handle_lookup_master_request(from, req, sender),
            _ => log::trace!(target: "slogcoord::forwarder", "ignoring request variant not handled by the forwarder"),
        }
    }

    fn handle_response(&mut self, _from: MachineId, response: Response, sender: &mut Sender, _timers: &mut TimerQueue<Self>) {
        match response.kind {
            Some(ResponseKind::LookupMaster(resp)) => self.handle_lookup_master_response(resp, sender),
            _ => log::trace!(target: "slogcoord::forwarder", "ignoring response variant not handled by the forwarder"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Configuration, proto::TransactionInternal};

    fn forwarder(local_replica: u16, local_partition: u16, num_replicas: u16, num_partitions: u16) -> Forwarder {
        let config = Configuration::for_test(num_replicas, num_partitions, local_replica, local_partition);
        Forwarder::new(Directory::new(config), InMemoryLookupMasterIndex::new())
    }

    fn txn(id: u64, keys: &[&str]) -> Transaction {
        let mut read_set = std::collections::HashMap::new();
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

    #[test]
    fn local_only_keys_need_no_remote_lookup_and_get_default_metadata() {
        let mut fwd = forwarder(0, 0, 1, 2);
        // both keys are even, landing on partition 0, which is local.
        let mut t = txn(1, &["2", "4"]);
        let need_remote = fwd.classify_keys(&mut t).unwrap();
        assert!(!need_remote);
        assert!(fwd.partitioned_lookup_buffer.is_empty());
        let internal = t.internal.unwrap();
        assert_eq!(internal.involved_partitions, vec![0, 0]);
        for key in ["2", "4"] {
            assert_eq!(
                internal.master_metadata.get(key).unwrap().master_region,
                fwd.directory.config().default_master_region_for_new_key
            );
        }
    }

    #[test]
    fn remote_keys_are_queued_per_partition_with_one_txn_id_each() {
        let mut fwd = forwarder(0, 0, 2, 4);
        // keys "1" and "5" both land on partition 1 (odd % 4), which is remote.
        let mut t = txn(7, &["1", "5"]);
        let need_remote = fwd.classify_keys(&mut t).unwrap();
        assert!(need_remote);
        let batch = fwd.partitioned_lookup_buffer.get(&1).unwrap();
        assert_eq!(batch.txn_ids, vec![7]);
        assert_eq!(batch.keys.len(), 2);
    }

    #[test]
    fn non_numeric_key_fails_classification() {
        let mut fwd = forwarder(0, 0, 1, 2);
        let mut t = txn(1, &["not-a-number"]);
        assert!(fwd.classify_keys(&mut t).is_err());
    }
}
