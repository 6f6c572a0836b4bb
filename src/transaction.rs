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

//! Helpers over the generated [`Transaction`] type: key iteration,
//! deduplication, and classification. These are pure functions so the
//! forwarder's decision logic can be unit tested without any sockets.

use std::collections::BTreeSet;

use crate::proto::{Transaction, TransactionType};

pub type TxnId = u64;

/// Every key touched by `txn`, from both the read and write sets, each
/// appearing once.
pub fn all_keys(txn: &Transaction) -> impl Iterator<Item = &String> {
    let write_only = txn.write_set.keys().filter(move |k| !txn.read_set.contains_key(*k));
    txn.read_set.keys().chain(write_only)
}

/// Sorts and deduplicates `involved_partitions` in place, per the invariant
/// that every transaction leaving the forwarder carries a canonical list.
pub fn dedup_involved_partitions(txn: &mut Transaction) {
    let internal = txn.internal.get_or_insert_with(Default::default);
    let unique: BTreeSet<u32> = internal.involved_partitions.iter().copied().collect();
    internal.involved_partitions = unique.into_iter().collect();
}

/// True once every key in `txn`'s read/write sets has an entry in
/// `internal.master_metadata`.
pub fn is_metadata_complete(txn: &Transaction) -> bool {
    let Some(internal) = txn.internal.as_ref() else {
        return false;
    };
    all_keys(txn).all(|k| internal.master_metadata.contains_key(k))
}

/// Classifies `txn` per the number of distinct master regions across its
/// keys' metadata. Returns `UNKNOWN` if metadata is incomplete.
pub fn classify(txn: &Transaction) -> TransactionType {
    if !is_metadata_complete(txn) {
        return TransactionType::Unknown;
    }
    let internal = txn.internal.as_ref().expect("checked by is_metadata_complete");
    let distinct_masters: BTreeSet<u32> = all_keys(txn)
        .filter_map(|k| internal.master_metadata.get(k))
        .map(|m| m.master_region)
        .collect();
    match distinct_masters.len() {
        0 => TransactionType::Unknown,
        1 => TransactionType::SingleHome,
        _ => TransactionType::MultiHome,
    }
}

/// The set of distinct master regions across `txn`'s keys. Only meaningful
/// once [`is_metadata_complete`] is true.
pub fn involved_masters(txn: &Transaction) -> BTreeSet<u32> {
    let Some(internal) = txn.internal.as_ref() else {
        return BTreeSet::new();
    };
    all_keys(txn)
        .filter_map(|k| internal.master_metadata.get(k))
        .map(|m| m.master_region)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{Metadata, TransactionInternal};

    fn txn_with_masters(masters: &[(&str, u32)]) -> Transaction {
        let mut txn = Transaction {
            id: 1,
            read_set: Default::default(),
            write_set: Default::default(),
            internal: Some(TransactionInternal::default()),
        };
        for (key, master) in masters {
            txn.read_set.insert(key.to_string(), String::new());
            txn.internal
                .as_mut()
                .unwrap()
                .master_metadata
                .insert(key.to_string(), Metadata { master_region: *master, counter: 0 });
        }
        txn
    }

    #[test]
    fn classify_is_single_home_when_all_masters_match() {
        let txn = txn_with_masters(&[("1", 0), ("2", 0)]);
        assert_eq!(classify(&txn), TransactionType::SingleHome);
    }

    #[test]
    fn classify_is_multi_home_when_masters_differ() {
        let txn = txn_with_masters(&[("1", 0), ("2", 1)]);
        assert_eq!(classify(&txn), TransactionType::MultiHome);
    }

    #[test]
    fn classify_is_unknown_when_metadata_incomplete() {
        let mut txn = txn_with_masters(&[("1", 0)]);
        txn.write_set.insert("2".to_string(), String::new());
        assert_eq!(classify(&txn), TransactionType::Unknown);
    }

    #[test]
    fn dedup_involved_partitions_sorts_and_removes_duplicates() {
        let mut txn = txn_with_masters(&[("1", 0)]);
        txn.internal.as_mut().unwrap().involved_partitions = vec![3, 1, 1, 2];
        dedup_involved_partitions(&mut txn);
        assert_eq!(txn.internal.unwrap().involved_partitions, vec![1, 2, 3]);
    }
}
