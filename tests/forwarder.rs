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

mod support;

use slogcoord::{
    directory::Directory,
    forwarder::{Forwarder, InMemoryLookupMasterIndex},
    module::ModuleRuntime,
    proto::{Metadata, TransactionType},
    types::{FORWARDER_CHANNEL, MULTI_HOME_ORDERER_CHANNEL, SCHEDULER_CHANNEL, SEQUENCER_CHANNEL},
};
use support::{forward_txn_request, init_logging, poll_until, sample_txn, start_broker, tcp_config, CaptureModule};

#[test]
fn local_only_transaction_is_dispatched_single_home_without_any_remote_lookup_traffic() {
    init_logging();
    let config = tcp_config(0, 0, &[(0, 0, 27201)]);
    let ctx = zmq::Context::new();
    let directory = Directory::new(config.clone());
    let handle = start_broker(config, ctx);

    let forwarder = Forwarder::new(directory, InMemoryLookupMasterIndex::new());
    let mut forwarder_runtime = ModuleRuntime::new(forwarder, FORWARDER_CHANNEL, &handle).unwrap();
    let mut sequencer = ModuleRuntime::new(CaptureModule::new(), SEQUENCER_CHANNEL, &handle).unwrap();

    // A single partition deployment: every key is local, so there is no other
    // partition to ask and no lookup batch is ever sent.
    let txn = sample_txn(1, &["2", "4"]);
    forwarder_runtime.sender().send_local(forward_txn_request(txn), FORWARDER_CHANNEL).unwrap();

    poll_until(50, || {
        forwarder_runtime.tick();
        sequencer.tick();
        !sequencer.module().received.is_empty()
    });

    assert_eq!(sequencer.module().received.len(), 1);
    let (_, dispatched) = &sequencer.module().received[0];
    assert_eq!(dispatched.id, 1);
    let internal = dispatched.internal.as_ref().unwrap();
    assert_eq!(internal.r#type, TransactionType::SingleHome as i32);
    assert_eq!(internal.involved_partitions, vec![0]);
}

#[test]
fn multi_home_transaction_is_forwarded_to_the_multi_home_orderer_after_remote_lookup_completes() {
    init_logging();
    // Two partitions of one replica: partition 0 is local to the forwarder
    // under test, partition 1 is a second broker in the same process acting
    // as the peer the remote lookup batch goes to.
    let config0 = tcp_config(0, 0, &[(0, 0, 27210), (0, 1, 27211)]);
    let mut config1 = config0.clone();
    config1.local_partition = 1;

    let mut local_index = InMemoryLookupMasterIndex::new();
    local_index.set("2", Metadata { master_region: 0, counter: 0 });
    let mut remote_index = InMemoryLookupMasterIndex::new();
    remote_index.set("3", Metadata { master_region: 1, counter: 0 });

    let directory0 = Directory::new(config0.clone());
    let directory1 = Directory::new(config1.clone());

    let handle0 = start_broker(config0, zmq::Context::new());
    let handle1 = start_broker(config1, zmq::Context::new());

    let mut forwarder_runtime = ModuleRuntime::new(Forwarder::new(directory0, local_index), FORWARDER_CHANNEL, &handle0).unwrap();
    let mut peer_forwarder_runtime =
        ModuleRuntime::new(Forwarder::new(directory1, remote_index), FORWARDER_CHANNEL, &handle1).unwrap();
    let mut multi_home_orderer = ModuleRuntime::new(CaptureModule::new(), MULTI_HOME_ORDERER_CHANNEL, &handle0).unwrap();

    // Key "2" is on the local partition and masters at region 0; key "3" is
    // on the remote partition and masters at region 1, so this transaction is
    // multi-home once both lookups complete.
    let txn = sample_txn(42, &["2", "3"]);
    forwarder_runtime.sender().send_local(forward_txn_request(txn), FORWARDER_CHANNEL).unwrap();

    poll_until(200, || {
        forwarder_runtime.tick();
        peer_forwarder_runtime.tick();
        multi_home_orderer.tick();
        !multi_home_orderer.module().received.is_empty()
    });

    assert_eq!(multi_home_orderer.module().received.len(), 1);
    let (_, dispatched) = &multi_home_orderer.module().received[0];
    assert_eq!(dispatched.id, 42);
    let internal = dispatched.internal.as_ref().unwrap();
    assert_eq!(internal.r#type, TransactionType::MultiHome as i32);
    assert_eq!(internal.master_metadata.get("2").unwrap().master_region, 0);
    assert_eq!(internal.master_metadata.get("3").unwrap().master_region, 1);
}

#[test]
fn bypass_multi_home_orderer_sends_sequencer_to_masters_only_and_scheduler_to_every_replica() {
    init_logging();
    // Three single-partition replicas: 0 and 1 each master one of the two
    // keys below, replica 2 masters neither and should only hear from the
    // Scheduler fan-out.
    let mut config0 = tcp_config(0, 0, &[(0, 0, 27220), (1, 0, 27221), (2, 0, 27222)]);
    config0.bypass_mh_orderer = true;
    let mut config1 = config0.clone();
    config1.local_replica = 1;
    let mut config2 = config0.clone();
    config2.local_replica = 2;

    let mut index = InMemoryLookupMasterIndex::new();
    index.set("2", Metadata { master_region: 0, counter: 0 });
    index.set("3", Metadata { master_region: 1, counter: 0 });
    let directory0 = Directory::new(config0.clone());

    let handle0 = start_broker(config0, zmq::Context::new());
    let handle1 = start_broker(config1, zmq::Context::new());
    let handle2 = start_broker(config2, zmq::Context::new());

    let mut forwarder_runtime = ModuleRuntime::new(Forwarder::new(directory0, index), FORWARDER_CHANNEL, &handle0).unwrap();
    let mut sequencer0 = ModuleRuntime::new(CaptureModule::new(), SEQUENCER_CHANNEL, &handle0).unwrap();
    let mut scheduler0 = ModuleRuntime::new(CaptureModule::new(), SCHEDULER_CHANNEL, &handle0).unwrap();
    let mut sequencer1 = ModuleRuntime::new(CaptureModule::new(), SEQUENCER_CHANNEL, &handle1).unwrap();
    let mut scheduler1 = ModuleRuntime::new(CaptureModule::new(), SCHEDULER_CHANNEL, &handle1).unwrap();
    let mut sequencer2 = ModuleRuntime::new(CaptureModule::new(), SEQUENCER_CHANNEL, &handle2).unwrap();
    let mut scheduler2 = ModuleRuntime::new(CaptureModule::new(), SCHEDULER_CHANNEL, &handle2).unwrap();

    // Both keys land on the forwarder's own (only) partition, so this
    // classifies and dispatches immediately, with no remote lookup round trip.
    let txn = sample_txn(7, &["2", "3"]);
    forwarder_runtime.sender().send_local(forward_txn_request(txn), FORWARDER_CHANNEL).unwrap();

    poll_until(50, || {
        forwarder_runtime.tick();
        sequencer0.tick();
        scheduler0.tick();
        sequencer1.tick();
        scheduler1.tick();
        sequencer2.tick();
        scheduler2.tick();
        !scheduler0.module().received.is_empty() && !scheduler1.module().received.is_empty() && !scheduler2.module().received.is_empty()
    });

    assert_eq!(sequencer0.module().received.len(), 1);
    assert_eq!(sequencer1.module().received.len(), 1);
    assert_eq!(sequencer2.module().received.len(), 0);

    assert_eq!(scheduler0.module().received.len(), 1);
    assert_eq!(scheduler1.module().received.len(), 1);
    assert_eq!(scheduler2.module().received.len(), 1);
}
