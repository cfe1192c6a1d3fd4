//! Message passing between the ranks of a learning job.
//!
//! Ranks run the same straight-line code and meet only at collectives, so a
//! single primitive is enough: [`Communicator::exchange`], an all-gather of
//! small word payloads. The reduction and barrier the schedulers need derive
//! from it. Collectives are globally ordered per communicator: every rank
//! issues the same sequence of calls, which is what lets the round-robin
//! query scheduler assign work without any extra messages.
//!
//! [`ChannelComm`] couples ranks with `std::sync::mpsc` channels; each rank
//! is expected to live on its own thread. A rank that disappears mid-job
//! leaves its peers blocked on a closed channel, which panics: a crashed
//! rank is fatal to the whole job.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};

/// A group of ranks that can meet at collectives.
pub trait Communicator {
    /// This rank's position within the group, in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Exchanges one payload per rank; returns every rank's payload, indexed
    /// by rank. Every rank must call `exchange` the same number of times
    /// with the group.
    fn exchange(&self, payload: Vec<u64>) -> Vec<Vec<u64>>;

    /// Returns `true` on rank 0, the sole writer of user-visible output.
    fn is_first(&self) -> bool {
        self.rank() == 0
    }

    /// Reduces one score to its minimum across all ranks.
    fn all_reduce_min(&self, value: f64) -> f64 {
        self.exchange(vec![value.to_bits()])
            .into_iter()
            .map(|words| f64::from_bits(words[0]))
            .fold(f64::INFINITY, f64::min)
    }

    /// Holds this rank until every rank has arrived.
    fn barrier(&self) {
        self.exchange(Vec::new());
    }
}

/// The lone rank of a sequential run.
pub struct SoloComm;

impl Communicator for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange(&self, payload: Vec<u64>) -> Vec<Vec<u64>> {
        vec![payload]
    }
}

struct Frame {
    seq: u64,
    from: usize,
    words: Vec<u64>,
}

/// One rank's endpoint of a channel-coupled group created by
/// [`channel_group`].
///
/// Frames carry the issuing rank's collective sequence number. A peer that
/// has already finished this collective may race ahead and send frames for
/// the next one; those are stashed until their collective comes up, so
/// consecutive collectives never interleave.
pub struct ChannelComm {
    rank: usize,
    peers: Vec<Sender<Frame>>,
    inbox: Receiver<Frame>,
    seq: Cell<u64>,
    stash: RefCell<BTreeMap<(u64, usize), Vec<u64>>>,
}

/// Creates the endpoints of a `size`-rank group. Endpoint `i` must be moved
/// to the thread that will act as rank `i`.
pub fn channel_group(size: usize) -> Vec<ChannelComm> {
    let mut senders = Vec::with_capacity(size);
    let mut inboxes = Vec::with_capacity(size);
    for _ in 0..size {
        let (tx, rx) = channel();
        senders.push(tx);
        inboxes.push(rx);
    }
    inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ChannelComm {
            rank,
            peers: senders.clone(),
            inbox,
            seq: Cell::new(0),
            stash: RefCell::new(BTreeMap::new()),
        })
        .collect()
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn exchange(&self, payload: Vec<u64>) -> Vec<Vec<u64>> {
        let seq = self.seq.get();
        self.seq.set(seq + 1);

        for (rank, peer) in self.peers.iter().enumerate() {
            if rank != self.rank {
                peer.send(Frame {
                    seq,
                    from: self.rank,
                    words: payload.clone(),
                })
                .expect("peer rank exited during a collective");
            }
        }

        let size = self.size();
        let mut gathered: Vec<Option<Vec<u64>>> = (0..size).map(|_| None).collect();
        gathered[self.rank] = Some(payload);
        let mut missing = size - 1;

        // Frames from faster peers may already be waiting from an earlier
        // exchange on this endpoint.
        let mut stash = self.stash.borrow_mut();
        let ready: Vec<usize> = stash
            .range((seq, 0)..(seq + 1, 0))
            .map(|(&(_, from), _)| from)
            .collect();
        for from in ready {
            gathered[from] = stash.remove(&(seq, from));
            missing -= 1;
        }

        while missing > 0 {
            let frame = self
                .inbox
                .recv()
                .expect("peer rank exited during a collective");
            if frame.seq == seq {
                gathered[frame.from] = Some(frame.words);
                missing -= 1;
            } else {
                stash.insert((frame.seq, frame.from), frame.words);
            }
        }

        gathered.into_iter().map(|words| words.unwrap()).collect()
    }
}
