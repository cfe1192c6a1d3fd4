//! Constraint-based discovery of Markov blankets and parents-and-children
//! sets.
//!
//! All seven algorithms share one driver, [`Discovery`]: a forward phase
//! admits candidates into a growing set, a backward phase removes the false
//! positives, and a symmetry correction keeps a neighbor only when the
//! relationship holds from both ends. The variants differ only in how the
//! forward phase scores and admits candidates.
//!
//! The direct family (GS, IAMB, Inter-IAMB) grows a candidate blanket first
//! and extracts the parents-and-children set from it; the topological family
//! (MMPC, HITON, SI-HITON-PC, GetPC) grows a candidate PC set first and
//! recovers the blanket by adding spouses.

use crate::comm::Communicator;
use crate::data::DiscreteData;
use crate::error::Error;
use crate::network::Network;
use crate::{VariableId, VariableSet};
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::str::FromStr;
use tracing::{debug, info};

/// The algorithm names accepted on the command line, in registry order.
pub const ALGORITHM_NAMES: &str = "gs,iamb,inter.iamb,mmpc,hiton,si.hiton.pc,getpc";

/// One of the supported constraint-based discovery strategies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Algorithm {
    /// Grow-shrink Markov blanket discovery.
    Gs,
    /// Incremental association Markov blanket discovery.
    Iamb,
    /// IAMB with a shrink sweep interleaved after every admission.
    InterIamb,
    /// Max-min parents-and-children discovery.
    Mmpc,
    /// HITON-PC with interleaved elimination.
    Hiton,
    /// Semi-interleaved HITON-PC: the admission test runs before insertion.
    SiHitonPc,
    /// MMPC-style forward phase that re-checks members on every insertion.
    GetPc,
}

impl Algorithm {
    /// Whether this strategy discovers the blanket first (the direct family)
    /// rather than the PC set first (the topological family).
    pub fn is_direct(self) -> bool {
        matches!(self, Algorithm::Gs | Algorithm::Iamb | Algorithm::InterIamb)
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Error> {
        match name {
            "gs" => Ok(Algorithm::Gs),
            "iamb" => Ok(Algorithm::Iamb),
            "inter.iamb" => Ok(Algorithm::InterIamb),
            "mmpc" => Ok(Algorithm::Mmpc),
            "hiton" => Ok(Algorithm::Hiton),
            "si.hiton.pc" => Ok(Algorithm::SiHitonPc),
            "getpc" => Ok(Algorithm::GetPc),
            _ => Err(Error::UnknownAlgorithm(ALGORITHM_NAMES)),
        }
    }
}

/// The generic discovery driver.
///
/// Per-target results are memoised for the life of the driver; the caches
/// are never invalidated because the dataset never changes. When the
/// communicator has more than one rank, every rank must issue the same
/// sequence of `mb`/`pc`/`network` calls: the ranks cooperate inside the
/// any-subset independence tests and inside `network`.
pub struct Discovery<'a, V: VariableId, C: Communicator> {
    data: &'a DiscreteData<'a>,
    comm: &'a C,
    algo: Algorithm,
    max_conditioning: usize,
    cmb_cache: RefCell<HashMap<V, VariableSet<V>>>,
    cpc_cache: RefCell<HashMap<V, VariableSet<V>>>,
    mb_cache: RefCell<HashMap<V, VariableSet<V>>>,
    pc_cache: RefCell<HashMap<V, VariableSet<V>>>,
}

impl<'a, V: VariableId, C: Communicator> Discovery<'a, V, C> {
    /// Creates a driver for the given strategy over the given oracle.
    pub fn new(
        data: &'a DiscreteData<'a>,
        comm: &'a C,
        algo: Algorithm,
        max_conditioning: usize,
    ) -> Self {
        Discovery {
            data,
            comm,
            algo,
            max_conditioning,
            cmb_cache: RefCell::new(HashMap::new()),
            cpc_cache: RefCell::new(HashMap::new()),
            mb_cache: RefCell::new(HashMap::new()),
            pc_cache: RefCell::new(HashMap::new()),
        }
    }

    /// The Markov blanket of `target`, symmetry corrected.
    pub fn mb(&self, target: V) -> VariableSet<V> {
        self.mb_inner(target, true)
    }

    /// The parents-and-children set of `target`, symmetry corrected.
    pub fn pc(&self, target: V) -> VariableSet<V> {
        self.pc_inner(target, true)
    }

    fn all_but(&self, target: V) -> VariableSet<V> {
        (0..self.data.num_vars())
            .map(V::from_usize)
            .filter(|&v| v != target)
            .collect()
    }

    /// Routes the any-subset test through the communicator when the call is
    /// part of a lockstep phase and there is more than one rank.
    fn independent_any_subset(
        &self,
        x: V,
        y: V,
        given: &VariableSet<V>,
        lockstep: bool,
    ) -> bool {
        if lockstep && self.comm.size() > 1 {
            self.data
                .is_independent_any_subset_comm(x, y, given, self.max_conditioning, self.comm)
        } else {
            self.data
                .is_independent_any_subset(x, y, given, self.max_conditioning)
        }
    }

    // ---- direct family: blanket first ----

    /// One grow sweep in candidate order, admitting every variable that is
    /// dependent on the target given the current blanket. Used by GS, which
    /// sweeps until nothing is admitted.
    fn grow_sweep(&self, target: V, candidates: &VariableSet<V>, mb: &mut VariableSet<V>) -> bool {
        let mut grown = false;
        for x in candidates.iter() {
            if !mb.contains(x) && !self.data.is_independent(target, x, mb) {
                debug!(node = target.as_usize(), x = x.as_usize(), "grow");
                mb.insert(x);
                grown = true;
            }
        }
        grown
    }

    /// The strongest-associated candidate outside the current blanket, if it
    /// is still dependent on the target. Ties go to the lowest index. Used
    /// by IAMB and Inter-IAMB.
    fn strongest_candidate(
        &self,
        target: V,
        candidates: &VariableSet<V>,
        mb: &VariableSet<V>,
    ) -> Option<V> {
        let mut best: Option<(V, f64)> = None;
        for x in candidates.iter() {
            if mb.contains(x) {
                continue;
            }
            let score = self.data.assoc_score(target, x, mb);
            if best.map_or(true, |(_, high)| score > high) {
                best = Some((x, score));
            }
        }
        match best {
            Some((x, score)) if !self.data.is_independent_score(score) => Some(x),
            _ => None,
        }
    }

    /// One backward sweep: removes every member that is independent of the
    /// target given the rest of the blanket. Returns whether anything went.
    fn shrink_sweep(&self, target: V, mb: &mut VariableSet<V>) -> bool {
        let mut shrunk = false;
        for x in mb.clone().iter() {
            let rest = mb.without(x);
            if self.data.is_independent(target, x, &rest) {
                debug!(node = target.as_usize(), x = x.as_usize(), "shrink");
                mb.remove(x);
                shrunk = true;
            }
        }
        shrunk
    }

    fn shrink(&self, target: V, mb: &mut VariableSet<V>) {
        while self.shrink_sweep(target, mb) {}
    }

    /// The candidate blanket of the direct family, before symmetry
    /// correction.
    fn candidate_mb(&self, target: V) -> VariableSet<V> {
        if let Some(hit) = self.cmb_cache.borrow().get(&target) {
            return hit.clone();
        }
        let candidates = self.all_but(target);
        let mut mb = VariableSet::new();
        match self.algo {
            Algorithm::Gs => {
                while self.grow_sweep(target, &candidates, &mut mb) {}
                self.shrink(target, &mut mb);
            }
            Algorithm::Iamb => {
                while let Some(x) = self.strongest_candidate(target, &candidates, &mb) {
                    mb.insert(x);
                }
                self.shrink(target, &mut mb);
            }
            Algorithm::InterIamb => {
                while let Some(x) = self.strongest_candidate(target, &candidates, &mb) {
                    mb.insert(x);
                    self.shrink_sweep(target, &mut mb);
                }
            }
            _ => unreachable!("topological strategies derive the blanket from the PC sets"),
        }
        debug!(node = target.as_usize(), size = mb.len(), "candidate blanket");
        self.cmb_cache
            .borrow_mut()
            .insert(target, mb.clone());
        mb
    }

    // ---- topological family: parents and children first ----

    /// The candidate among `candidates` maximising the minimum association
    /// with the target over subsets of the current PC set (the max-min
    /// heuristic). Ties go to the lowest index.
    fn max_min_candidate(
        &self,
        target: V,
        candidates: &VariableSet<V>,
        cpc: &VariableSet<V>,
    ) -> Option<(V, f64)> {
        let mut best: Option<(V, f64)> = None;
        for x in candidates.iter() {
            let score = self
                .data
                .min_assoc_score(target, x, cpc, self.max_conditioning);
            if best.map_or(true, |(_, high)| score > high) {
                best = Some((x, score));
            }
        }
        best
    }

    /// One elimination sweep over the current PC set. Used after admissions
    /// by HITON and GetPC, and as the final backward phase.
    fn eliminate(&self, target: V, cpc: &mut VariableSet<V>, lockstep: bool) {
        for y in cpc.clone().iter() {
            let rest = cpc.without(y);
            if self.independent_any_subset(target, y, &rest, lockstep) {
                debug!(node = target.as_usize(), y = y.as_usize(), "eliminate");
                cpc.remove(y);
            }
        }
    }

    /// The candidate PC set of the topological family, before symmetry
    /// correction.
    fn candidate_pc_search(&self, target: V, lockstep: bool) -> VariableSet<V> {
        let mut candidates = self.all_but(target);
        let mut cpc = VariableSet::new();
        match self.algo {
            Algorithm::Mmpc | Algorithm::GetPc => loop {
                let Some((x, score)) = self.max_min_candidate(target, &candidates, &cpc) else {
                    break;
                };
                if self.data.is_independent_score(score) {
                    break;
                }
                debug!(node = target.as_usize(), x = x.as_usize(), "admit");
                cpc.insert(x);
                candidates.remove(x);
                if self.algo == Algorithm::GetPc {
                    self.eliminate(target, &mut cpc, lockstep);
                }
            },
            Algorithm::Hiton | Algorithm::SiHitonPc => {
                // Marginal associations never change, so the priority order
                // is fixed up front: descending score, ties by index.
                let nil = VariableSet::new();
                let mut queue: Vec<(V, f64)> = candidates
                    .iter()
                    .map(|x| (x, self.data.assoc_score(target, x, &nil)))
                    .collect();
                queue.sort_by(|a, b| b.1.total_cmp(&a.1));
                for (x, score) in queue {
                    if self.data.is_independent_score(score) {
                        break;
                    }
                    if self.algo == Algorithm::SiHitonPc {
                        // Admission test before insertion; a rejected
                        // candidate never comes back.
                        if !self.independent_any_subset(target, x, &cpc, lockstep) {
                            debug!(node = target.as_usize(), x = x.as_usize(), "admit");
                            cpc.insert(x);
                        }
                    } else {
                        debug!(node = target.as_usize(), x = x.as_usize(), "admit");
                        cpc.insert(x);
                        self.eliminate(target, &mut cpc, lockstep);
                    }
                }
            }
            _ => unreachable!("direct strategies extract the PC set from the blanket"),
        }
        if self.algo != Algorithm::SiHitonPc {
            self.eliminate(target, &mut cpc, lockstep);
        }
        cpc
    }

    /// The candidate PC set of either family, before symmetry correction.
    fn candidate_pc(&self, target: V, lockstep: bool) -> VariableSet<V> {
        if let Some(hit) = self.cpc_cache.borrow().get(&target) {
            return hit.clone();
        }
        let cpc = if self.algo.is_direct() {
            let cmb = self.candidate_mb(target);
            cmb.iter()
                .filter(|&v| {
                    let rest = cmb.without(v);
                    !self.independent_any_subset(target, v, &rest, lockstep)
                })
                .collect()
        } else {
            self.candidate_pc_search(target, lockstep)
        };
        debug!(node = target.as_usize(), size = cpc.len(), "candidate pc");
        self.cpc_cache
            .borrow_mut()
            .insert(target, cpc.clone());
        cpc
    }

    fn pc_inner(&self, target: V, lockstep: bool) -> VariableSet<V> {
        if let Some(hit) = self.pc_cache.borrow().get(&target) {
            return hit.clone();
        }
        let cpc = self.candidate_pc(target, lockstep);
        let pc: VariableSet<V> = cpc
            .iter()
            .filter(|&v| self.candidate_pc(v, lockstep).contains(target))
            .collect();
        self.pc_cache.borrow_mut().insert(target, pc.clone());
        pc
    }

    fn mb_inner(&self, target: V, lockstep: bool) -> VariableSet<V> {
        if let Some(hit) = self.mb_cache.borrow().get(&target) {
            return hit.clone();
        }
        let mb = if self.algo.is_direct() {
            let cmb = self.candidate_mb(target);
            cmb.iter()
                .filter(|&v| self.candidate_mb(v).contains(target))
                .collect()
        } else {
            self.spouses_into_blanket(target, lockstep)
        };
        info!(node = target.as_usize(), size = mb.len(), "blanket");
        self.mb_cache.borrow_mut().insert(target, mb.clone());
        mb
    }

    /// Builds the blanket of the topological family: the PC set plus every
    /// spouse, recovered by the seeded any-subset test. A spouse candidate x
    /// reached through the common child y joins the blanket when x and the
    /// target stay dependent on every conditioning set that includes y.
    fn spouses_into_blanket(&self, target: V, lockstep: bool) -> VariableSet<V> {
        let pc = self.pc_inner(target, lockstep);
        let mut mb = pc.clone();
        for y in pc.iter() {
            let pc_of_y = self.pc_inner(y, lockstep);
            for x in pc_of_y.iter() {
                if x == target || mb.contains(x) {
                    continue;
                }
                let mut pool = pc.union(&pc_of_y);
                pool.remove(target);
                pool.remove(x);
                pool.remove(y);
                let seed = VariableSet::from_slice(&[y]);
                if !self.data.is_independent_any_subset_seeded(
                    target,
                    x,
                    &pool,
                    &seed,
                    self.max_conditioning,
                ) {
                    debug!(
                        node = target.as_usize(),
                        x = x.as_usize(),
                        y = y.as_usize(),
                        "spouse"
                    );
                    mb.insert(x);
                }
            }
        }
        mb
    }

    // ---- whole-network learning ----

    /// Learns the whole skeleton (and optionally orients its v-structures).
    ///
    /// Variables are dealt to the ranks in waves over a rank permutation;
    /// after each wave the ranks exchange their cumulative test counts, and
    /// when the maximum load exceeds the mean by more than
    /// `imbalance_threshold` the permutation re-sorts by ascending load, so
    /// pending variables migrate toward the idle ranks. Every rank derives
    /// the same reassignment from the same gathered loads, so no further
    /// coordination is needed. A final exchange hands every rank all the
    /// candidate PC sets, and assembly proceeds identically everywhere.
    pub fn network(&self, direct_edges: bool, imbalance_threshold: f64) -> Network<V> {
        let n = self.data.num_vars();
        let size = self.comm.size();
        let mut order: Vec<usize> = (0..size).collect();
        let mut pending: VecDeque<usize> = (0..n).collect();
        let mut mine: Vec<(V, VariableSet<V>)> = Vec::new();

        while !pending.is_empty() {
            let wave: Vec<usize> = {
                let take = pending.len().min(size);
                pending.drain(..take).collect()
            };
            for (slot, &var) in wave.iter().enumerate() {
                if order[slot] == self.comm.rank() {
                    let v = V::from_usize(var);
                    mine.push((v, self.candidate_pc(v, false)));
                }
            }

            let loads: Vec<u64> = self
                .comm
                .exchange(vec![self.data.tests_run()])
                .into_iter()
                .map(|words| words[0])
                .collect();
            if imbalance_threshold > 0.0 && size > 1 && !pending.is_empty() {
                let mean = loads.iter().sum::<u64>() as f64 / size as f64;
                let max = loads.iter().copied().max().unwrap_or(0) as f64;
                if mean > 0.0 && max / mean > imbalance_threshold {
                    order.sort_by_key(|&rank| (loads[rank], rank));
                    debug!(max, mean, "rebalanced variable assignment");
                }
            }
        }

        let gathered = self.comm.exchange(encode_neighborhoods(&mine));
        let mut cpcs: Vec<VariableSet<V>> = vec![VariableSet::new(); n];
        for words in gathered {
            for (var, cpc) in decode_neighborhoods::<V>(&words) {
                cpcs[var] = cpc;
            }
        }
        // The gathered sets are exactly what candidate_pc would compute, so
        // seed the cache for any later single-target queries.
        {
            let mut cache = self.cpc_cache.borrow_mut();
            for (var, cpc) in cpcs.iter().enumerate() {
                cache.entry(V::from_usize(var)).or_insert_with(|| cpc.clone());
            }
        }
        info!(n, "assembling network");
        Network::assemble(self.data, &cpcs, direct_edges, self.max_conditioning)
    }
}

fn encode_neighborhoods<V: VariableId>(items: &[(V, VariableSet<V>)]) -> Vec<u64> {
    let mut words = Vec::new();
    for (var, set) in items {
        words.push(var.as_usize() as u64);
        words.push(set.len() as u64);
        words.extend(set.iter().map(|x| x.as_usize() as u64));
    }
    words
}

fn decode_neighborhoods<V: VariableId>(words: &[u64]) -> Vec<(usize, VariableSet<V>)> {
    let mut items = Vec::new();
    let mut at = 0;
    while at < words.len() {
        let var = words[at] as usize;
        let len = words[at + 1] as usize;
        let set = words[at + 2..at + 2 + len]
            .iter()
            .map(|&word| V::from_usize(word as usize))
            .collect();
        items.push((var, set));
        at += 2 + len;
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_parse() {
        for (name, algo) in [
            ("gs", Algorithm::Gs),
            ("iamb", Algorithm::Iamb),
            ("inter.iamb", Algorithm::InterIamb),
            ("mmpc", Algorithm::Mmpc),
            ("hiton", Algorithm::Hiton),
            ("si.hiton.pc", Algorithm::SiHitonPc),
            ("getpc", Algorithm::GetPc),
        ] {
            assert_eq!(name.parse::<Algorithm>().unwrap(), algo);
        }
        assert!("pc.stable".parse::<Algorithm>().is_err());
    }

    #[test]
    fn neighborhood_codec_round_trips() {
        let items: Vec<(u8, VariableSet<u8>)> = vec![
            (0, VariableSet::from_slice(&[1, 2])),
            (3, VariableSet::new()),
            (5, VariableSet::from_slice(&[0])),
        ];
        let decoded = decode_neighborhoods::<u8>(&encode_neighborhoods(&items));
        assert_eq!(decoded.len(), 3);
        for ((var, set), (dvar, dset)) in items.iter().zip(&decoded) {
            assert_eq!(var.as_usize(), *dvar);
            assert_eq!(set, dset);
        }
    }
}
