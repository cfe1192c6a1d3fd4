//! Counting queries over a column-major categorical dataset.
//!
//! The counter owns the only copy of the observations. Each variable's
//! observed values are recoded to dense levels `0..arity` at construction,
//! so the per-variable arity is exactly the number of distinct values seen
//! and a contingency cube over any variable tuple can be addressed with a
//! mixed-radix code. Queries always speak the file's raw category values;
//! the recoding is internal.

use crate::error::{Error, Result};
use crate::{VariableId, VariableSet};

/// Answers conjunction counts over a discrete dataset of `n` variables and
/// `m` observations.
pub struct CtCounter {
    n: usize,
    m: usize,
    /// Variable-major storage of dense level codes; variable `v` occupies
    /// `data[v * m .. (v + 1) * m]`.
    data: Vec<u8>,
    /// The sorted raw values observed for each variable. A raw value's
    /// position in this list is its dense level code, so `levels[v].len()`
    /// is the arity of `v`.
    levels: Vec<Vec<u8>>,
}

/// A dense joint-count cube over ⟨x, y, Z⟩, produced by
/// [`CtCounter::tabulate`]. Cell `(a, b, z)` lives at
/// `(z * dx + a) * dy + b`.
pub struct ContingencyTable {
    /// Arity of the first variable.
    pub dx: usize,
    /// Arity of the second variable.
    pub dy: usize,
    /// Product of the arities of the conditioning variables (1 for an empty
    /// conditioning set).
    pub dz: usize,
    /// Joint observation counts, `dx * dy * dz` cells.
    pub cells: Vec<u32>,
}

impl CtCounter {
    /// Builds a counter from a variable-major stream of raw category values.
    ///
    /// The stream must yield exactly `n * m` values: all observations of
    /// variable 0, then all observations of variable 1, and so on.
    pub fn create(n: usize, m: usize, values: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut data: Vec<u8> = values.into_iter().collect();
        if data.len() != n * m {
            return Err(Error::Shape(format!(
                "expected {} values ({} variables x {} observations), got {}",
                n * m,
                n,
                m,
                data.len()
            )));
        }

        let mut levels = Vec::with_capacity(n);
        for v in 0..n {
            let column = &mut data[v * m..(v + 1) * m];
            let mut seen = [false; 256];
            for &value in column.iter() {
                seen[value as usize] = true;
            }
            let observed: Vec<u8> = (0u16..256)
                .filter(|&value| seen[value as usize])
                .map(|value| value as u8)
                .collect();
            let mut dense = [0u8; 256];
            for (code, &raw) in observed.iter().enumerate() {
                dense[raw as usize] = code as u8;
            }
            for value in column.iter_mut() {
                *value = dense[*value as usize];
            }
            levels.push(observed);
        }

        Ok(CtCounter { n, m, data, levels })
    }

    /// Number of variables in the dataset.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of observations in the dataset.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Number of distinct values observed for the given variable.
    pub fn arity<V: VariableId>(&self, x: V) -> usize {
        self.levels[x.as_usize()].len()
    }

    fn column<V: VariableId>(&self, x: V) -> &[u8] {
        let v = x.as_usize();
        &self.data[v * self.m..(v + 1) * self.m]
    }

    /// Number of observations matching the conjunction
    /// `vars[0] = values[0] ∧ vars[1] = values[1] ∧ …`, with values given in
    /// the file's raw coding. An empty conjunction matches every observation.
    pub fn count<V: VariableId>(&self, vars: &[V], values: &[u8]) -> u32 {
        debug_assert_eq!(vars.len(), values.len());
        if vars.is_empty() {
            return self.m as u32;
        }

        // A value never observed for its variable matches nothing.
        let mut dense = Vec::with_capacity(vars.len());
        for (&x, &value) in vars.iter().zip(values) {
            match self.levels[x.as_usize()].binary_search(&value) {
                Ok(code) => dense.push(code as u8),
                Err(_) => return 0,
            }
        }

        let columns: Vec<&[u8]> = vars.iter().map(|&x| self.column(x)).collect();
        let mut matched = 0u32;
        for row in 0..self.m {
            if columns.iter().zip(&dense).all(|(col, &code)| col[row] == code) {
                matched += 1;
            }
        }
        matched
    }

    /// Fills the joint-count cube for ⟨x, y, Z⟩ in a single pass over the
    /// observations.
    pub fn tabulate<V: VariableId>(&self, x: V, y: V, zs: &VariableSet<V>) -> ContingencyTable {
        let dx = self.arity(x);
        let dy = self.arity(y);
        let zcols: Vec<&[u8]> = zs.iter().map(|z| self.column(z)).collect();
        let zarities: Vec<usize> = zs.iter().map(|z| self.arity(z)).collect();
        let dz: usize = zarities.iter().product::<usize>().max(1);

        let xcol = self.column(x);
        let ycol = self.column(y);
        let mut cells = vec![0u32; dx * dy * dz];
        for row in 0..self.m {
            let mut zcode = 0usize;
            for (col, &arity) in zcols.iter().zip(&zarities) {
                zcode = zcode * arity + col[row] as usize;
            }
            cells[(zcode * dx + xcol[row] as usize) * dy + ycol[row] as usize] += 1;
        }

        ContingencyTable { dx, dy, dz, cells }
    }
}
