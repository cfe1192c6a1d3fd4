#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate learns the local causal neighborhood (the Markov blanket or
//! the parents-and-children set) of discrete categorical variables, and by
//! composition a whole Bayesian-network skeleton, using constraint-based
//! structure-learning algorithms as described by these papers:
//!
//! - Margaritis and Thrun, [Bayesian Network Induction via Local
//!   Neighborhoods][gs], 1999 (grow-shrink)
//! - Tsamardinos, Aliferis and Statnikov, [Algorithms for Large Scale Markov
//!   Blanket Discovery][iamb], 2003 (IAMB, Inter-IAMB)
//! - Tsamardinos, Brown and Aliferis, [The max-min hill-climbing Bayesian
//!   network structure learning algorithm][mmhc], 2006 (MMPC)
//! - Aliferis, Tsamardinos and Statnikov, [HITON: A Novel Markov Blanket
//!   Algorithm for Optimal Variable Selection][hiton], 2003
//! - Peña, Nilsson, Björkegren and Tegnér, [Towards scalable and data
//!   efficient learning of Markov boundaries][getpc], 2007 (GetPC)
//!
//! [gs]: https://papers.nips.cc/paper/1685-bayesian-network-induction-via-local-neighborhoods
//! [iamb]: https://www.aaai.org/Papers/FLAIRS/2003/Flairs03-073.pdf
//! [mmhc]: https://link.springer.com/article/10.1007/s10994-006-6889-7
//! [hiton]: https://pubmed.ncbi.nlm.nih.gov/14728126/
//! [getpc]: https://www.sciencedirect.com/science/article/pii/S0888613X06000600
//!
//! The conditional-independence decisions all come from the G² statistic
//! evaluated against a χ² tail; see [`data::DiscreteData`]. Queries can be
//! spread over a group of communicating ranks; see [`comm`].

pub use sorted_iter;

use smallvec::SmallVec;
use sorted_iter::assume::AssumeSortedByItemExt;
use sorted_iter::sorted_iterator::SortedByItem;
use sorted_iter::SortedIterator;
use std::iter;

pub mod comm;
pub mod counter;
pub mod data;
pub mod discovery;
pub mod error;
pub mod network;
pub mod reader;

pub use error::Error;

/// Types which can be used as variable indices in a [`VariableSet`].
///
/// A variable index doubles as a dense cursor into the column-major dataset,
/// so implementations must round-trip through `usize` for every index the
/// dataset can produce. The driver picks the narrowest width that fits the
/// variable count once, at startup.
pub trait VariableId: Sized + Copy + std::hash::Hash + Ord {
    /// SmallVec contains two `usize` fields which overlap with the inline
    /// vector, so variable sets will have minimum size if this array occupies
    /// the same number of bytes.
    ///
    /// It can be declared like this for any implementation, or you can have
    /// the [`variable_id!`] macro do it for you.
    ///
    /// ```ignore
    /// use std::mem::size_of;
    /// type SmallArray = [Self; 2 * size_of::<usize>() / size_of::<Self>()];
    /// ```
    type SmallArray: smallvec::Array<Item = Self> + Clone + std::fmt::Debug + std::hash::Hash + Ord;

    /// The dense cursor corresponding to this index.
    fn as_usize(self) -> usize;

    /// The index corresponding to a dense cursor. The caller guarantees that
    /// `i` fits the implementing width.
    fn from_usize(i: usize) -> Self;
}

/// Generates implementations of the [`VariableId`] trait which set the
/// associated `SmallArray` type to the biggest array that will fit within a
/// [`SmallVec`][smallvec::SmallVec]'s minimum size.
///
/// It also generates a test with the given `$testname` that checks that the
/// generated definition is as small as the smallest `SmallVec`.
///
/// This library provides implementations for the unsigned integer types
/// using this declaration:
///
/// ```ignore
/// variable_id![unsigned_id_size, u8, u16, u32, u64, usize];
/// ```
#[macro_export]
macro_rules! variable_id {
    ($testname:ident, $($t:ty),*) => {
        $(
            impl $crate::VariableId for $t {
                type SmallArray = [
                    Self;
                    2 * ::std::mem::size_of::<usize>() / ::std::mem::size_of::<Self>()
                ];

                fn as_usize(self) -> usize {
                    self as usize
                }

                fn from_usize(i: usize) -> Self {
                    i as $t
                }
            }
        )*

        #[cfg(test)]
        #[test]
        fn $testname() {
            use $crate::VariableSet;
            use smallvec::SmallVec;
            use std::mem::size_of;
            $(
                assert_eq!(
                    size_of::<VariableSet<$t>>(),
                    size_of::<SmallVec<[(); 0]>>()
                );
            )*
        }
    };
}

variable_id![unsigned_id_size, u8, u16, u32, u64, usize];

/// An ordered set of variable indices.
///
/// This implementation avoids heap allocations for sets containing a number
/// of variables smaller than the length of [`VariableId::SmallArray`], which
/// covers almost every conditioning set the discovery algorithms build.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VariableSet<V: VariableId>(SmallVec<V::SmallArray>);

impl<V: VariableId> Default for VariableSet<V> {
    fn default() -> Self {
        VariableSet::new()
    }
}

impl<V: VariableId> VariableSet<V> {
    /// Creates an empty variable set.
    pub fn new() -> Self {
        VariableSet(SmallVec::new())
    }

    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided slice contains duplicates.
    pub fn from_slice(ids: &[V]) -> Self {
        let mut v = SmallVec::from_slice(ids);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }

    /// The number of variables in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set contains no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the variables which appear in this set.
    ///
    /// ```
    /// use blanket::VariableSet;
    ///
    /// let abc = VariableSet::from_slice(&[2u8, 3, 1]);
    /// let mut it = abc.iter();
    /// assert_eq!(it.next(), Some(1));
    /// assert_eq!(it.next(), Some(2));
    /// assert_eq!(it.next(), Some(3));
    /// assert_eq!(it.next(), None);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = V> + SortedByItem + Clone + '_ {
        self.0.iter().copied().assume_sorted_by_item()
    }

    /// Returns `true` if the given variable appears in this set.
    ///
    /// ```
    /// use blanket::VariableSet;
    ///
    /// let ab = VariableSet::from_slice(&[1u8, 2]);
    /// assert!(ab.contains(1));
    /// assert!(!ab.contains(3));
    /// ```
    pub fn contains(&self, id: V) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// Adds a variable to this set. Inserting a variable which is already
    /// present leaves the set unchanged.
    ///
    /// ```
    /// use blanket::VariableSet;
    ///
    /// let mut s = VariableSet::new();
    /// s.insert(2u8);
    /// s.insert(1);
    /// s.insert(2);
    /// assert_eq!(s, VariableSet::from_slice(&[1, 2]));
    /// ```
    pub fn insert(&mut self, id: V) {
        if let Err(at) = self.0.binary_search(&id) {
            self.0.insert(at, id);
        }
    }

    /// Removes a variable from this set. Removing an absent variable leaves
    /// the set unchanged.
    pub fn remove(&mut self, id: V) {
        if let Ok(at) = self.0.binary_search(&id) {
            self.0.remove(at);
        }
    }

    /// Returns a new set containing every variable which appears in either
    /// input.
    ///
    /// ```
    /// use blanket::VariableSet;
    ///
    /// let ab = VariableSet::from_slice(&[1u8, 2]);
    /// let bc = VariableSet::from_slice(&[2u8, 3]);
    /// assert_eq!(ab.union(&bc), VariableSet::from_slice(&[1, 2, 3]));
    /// ```
    pub fn union(&self, other: &Self) -> Self {
        VariableSet(self.iter().union(other.iter()).collect())
    }

    /// Returns a new set containing every variable of `self` which does not
    /// appear in `other`.
    ///
    /// ```
    /// use blanket::VariableSet;
    ///
    /// let abc = VariableSet::from_slice(&[1u8, 2, 3]);
    /// let b = VariableSet::from_slice(&[2u8]);
    /// assert_eq!(abc.difference(&b), VariableSet::from_slice(&[1, 3]));
    /// ```
    pub fn difference(&self, other: &Self) -> Self {
        VariableSet(self.iter().difference(other.iter()).collect())
    }

    /// Returns a copy of this set with one variable removed.
    pub fn without(&self, id: V) -> Self {
        let mut copy = self.clone();
        copy.remove(id);
        copy
    }

    /// Returns `true` if `other` contains every variable that `self` does.
    ///
    /// ```
    /// use blanket::VariableSet;
    /// let nil = VariableSet::<u8>::new();
    /// let one = VariableSet::from_slice(&[1u8]);
    ///
    /// assert!(nil.is_subset(&one));
    /// assert!(nil.is_subset(&nil));
    /// assert!(one.is_subset(&one));
    /// assert!(!one.is_subset(&nil));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().intersection(other.iter()).eq(self.iter())
    }

    /// Returns an iterator over every `k`-element subset of this set, in
    /// lexicographic order of the member indices. See [`KSubsets`].
    pub fn subsets(&self, k: usize) -> KSubsets<'_, V> {
        KSubsets::new(self, k)
    }
}

impl<V: VariableId + std::fmt::Debug> std::fmt::Debug for VariableSet<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl<V: VariableId> iter::FromIterator<V> for VariableSet<V> {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided iterator contains duplicates.
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let mut v = SmallVec::from_iter(iter);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }
}

/// An iterator over every `k`-element subset of a [`VariableSet`], produced
/// in lexicographic order of the member indices.
///
/// The enumeration is an explicit state machine over an index array rather
/// than a recursion, so a consumer can interleave it with other work and
/// every consumer of the same set sees the same sequence. Two edge cases are
/// part of the contract: `k = 0` produces exactly one subset (the empty
/// set), and `k > len` produces nothing.
///
/// ```
/// use blanket::VariableSet;
///
/// let abc = VariableSet::from_slice(&[1u8, 2, 3]);
/// let pairs: Vec<_> = abc.subsets(2).collect();
/// assert_eq!(pairs, vec![
///     VariableSet::from_slice(&[1, 2]),
///     VariableSet::from_slice(&[1, 3]),
///     VariableSet::from_slice(&[2, 3]),
/// ]);
/// assert_eq!(abc.subsets(0).count(), 1);
/// assert_eq!(abc.subsets(4).count(), 0);
/// ```
pub struct KSubsets<'a, V: VariableId> {
    items: &'a [V],
    indices: Vec<usize>,
    done: bool,
}

impl<'a, V: VariableId> KSubsets<'a, V> {
    fn new(set: &'a VariableSet<V>, k: usize) -> Self {
        KSubsets {
            items: &set.0,
            indices: (0..k).collect(),
            done: k > set.len(),
        }
    }
}

impl<V: VariableId> Iterator for KSubsets<'_, V> {
    type Item = VariableSet<V>;

    fn next(&mut self) -> Option<VariableSet<V>> {
        if self.done {
            return None;
        }
        let subset = VariableSet(self.indices.iter().map(|&i| self.items[i]).collect());

        // Advance the rightmost index that still has headroom; everything to
        // its right restarts immediately after it.
        let k = self.indices.len();
        let n = self.items.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] + (k - i) < n {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }
        Some(subset)
    }
}
