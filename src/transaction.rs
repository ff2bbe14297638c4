use crate::error::{ReductionError, Result};
use std::fmt;

/// Transaction is a hypothetical transfer from bus `a` to bus `b`, always
/// held in canonical order `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Transaction {
    pub a: usize,
    pub b: usize,
}

impl Transaction {
    /// Canonical transaction between two distinct buses, in either order.
    pub fn new(a: usize, b: usize) -> Result<Self> {
        if a == b {
            return Err(ReductionError::InvalidTransaction(a));
        }
        Ok(Self {
            a: a.min(b),
            b: a.max(b),
        })
    }

    /// All N(N-1)/2 canonical transactions between the given ids, ordered
    /// by `(a, b)`.
    pub fn all(ids: &[usize]) -> Vec<Transaction> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let n = sorted.len();
        let mut txs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for (i, &a) in sorted.iter().enumerate() {
            for &b in &sorted[i + 1..] {
                txs.push(Transaction { a, b });
            }
        }
        txs
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.a, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order() {
        let t = Transaction::new(5, 2).unwrap();
        assert_eq!((t.a, t.b), (2, 5));
        assert_eq!(t, Transaction::new(2, 5).unwrap());
    }

    #[test]
    fn same_bus_is_rejected() {
        assert!(matches!(
            Transaction::new(3, 3),
            Err(ReductionError::InvalidTransaction(3))
        ));
    }

    #[test]
    fn count_is_n_choose_two() {
        let ids = (1..=7).collect::<Vec<usize>>();
        assert_eq!(Transaction::all(&ids).len(), 21);
        assert!(Transaction::all(&[4]).is_empty());
    }

    #[test]
    fn all_is_sorted_regardless_of_input_order() {
        let txs = Transaction::all(&[9, 3, 6]);
        let pairs = txs.iter().map(|t| (t.a, t.b)).collect::<Vec<_>>();
        assert_eq!(pairs, vec![(3, 6), (3, 9), (6, 9)]);
    }
}
