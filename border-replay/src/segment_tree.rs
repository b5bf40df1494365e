//! Segment tree with an associative reduction over its leaves.
//!
//! [`ReductionTree`] keeps every internal node equal to the combination of its
//! two children, so point updates, range reductions and prefix searches all
//! run in `O(log L)`. With [`Sum`] it is the sum tree of prioritized
//! sampling, with [`Min`] it tracks the smallest priority.
use crate::error::{check_index, ReplayBufferError, Result};
use num_traits::Float;
use std::fmt::Debug;

/// An associative operation with an identity element.
pub trait Reduction<T>: Debug + Send + Sync {
    /// Identity element of [`Reduction::combine`].
    fn identity(&self) -> T;

    /// Combines two values.
    fn combine(&self, a: T, b: T) -> T;
}

/// Addition, identity 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl<T: Float> Reduction<T> for Sum {
    fn identity(&self) -> T {
        T::zero()
    }

    fn combine(&self, a: T, b: T) -> T {
        a + b
    }
}

/// Minimum, identity +infinity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl<T: Float> Reduction<T> for Min {
    fn identity(&self) -> T {
        T::infinity()
    }

    fn combine(&self, a: T, b: T) -> T {
        a.min(b)
    }
}

/// Binary tree of `2L - 1` nodes over `L` leaves, `L` a power of two.
///
/// Node `k` has children `2k + 1` and `2k + 2`; leaf `i` is node `L - 1 + i`.
#[derive(Debug, Clone)]
pub struct ReductionTree<T, R> {
    n_leaves: usize,
    nodes: Vec<T>,
    op: R,
}

impl<T, R> ReductionTree<T, R>
where
    T: Copy + Debug,
    R: Reduction<T>,
{
    /// Creates a tree with at least `capacity` leaves, all set to the identity.
    pub fn new(capacity: usize, op: R) -> Result<Self> {
        if capacity == 0 {
            return Err(ReplayBufferError::Configuration(
                "Capacity must be at least 1".to_string(),
            ));
        }
        let n_leaves = capacity.checked_next_power_of_two().ok_or_else(|| {
            ReplayBufferError::Configuration(format!("Capacity {} is too large", capacity))
        })?;

        Ok(Self {
            n_leaves,
            nodes: vec![op.identity(); 2 * n_leaves - 1],
            op,
        })
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.n_leaves
    }

    /// Always `false`; a tree has at least one leaf.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value of the combined leaves, i.e., the root.
    pub fn root(&self) -> T {
        self.nodes[0]
    }

    /// Value of leaf `index`.
    pub fn get(&self, index: usize) -> Result<T> {
        check_index(index, self.n_leaves)?;
        Ok(self.nodes[self.leaf(index)])
    }

    #[inline]
    fn leaf(&self, index: usize) -> usize {
        index + self.n_leaves - 1
    }

    #[inline]
    fn update_node(&mut self, k: usize) {
        self.nodes[k] = self
            .op
            .combine(self.nodes[2 * k + 1], self.nodes[2 * k + 2]);
    }

    /// Sets leaf `index` to `value` and updates its ancestors.
    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        check_index(index, self.n_leaves)?;
        let mut k = self.leaf(index);
        self.nodes[k] = value;
        while k > 0 {
            k = (k - 1) / 2;
            self.update_node(k);
        }
        Ok(())
    }

    /// Sets `count` leaves from `start` to values taken from `f`, wrapping
    /// around `ring_capacity` like the ring store does.
    ///
    /// Each ancestor of the written leaves is recomputed once.
    pub fn set_bulk<F>(&mut self, start: usize, mut f: F, count: usize, ring_capacity: usize) -> Result<()>
    where
        F: FnMut() -> T,
    {
        if ring_capacity == 0 || ring_capacity > self.n_leaves {
            return Err(ReplayBufferError::OutOfRange {
                index: ring_capacity,
                bound: self.n_leaves + 1,
            });
        }
        check_index(start, ring_capacity)?;
        if count > ring_capacity {
            return Err(ReplayBufferError::ContractViolation(format!(
                "Cannot set {} leaves at once in a ring of capacity {}",
                count, ring_capacity
            )));
        }

        let n_tail = count.min(ring_capacity - start);
        self.set_run(start, n_tail, &mut f);
        if n_tail < count {
            self.set_run(0, count - n_tail, &mut f);
        }
        Ok(())
    }

    fn set_run<F: FnMut() -> T>(&mut self, start: usize, n: usize, f: &mut F) {
        if n == 0 {
            return;
        }
        let (mut lo, mut hi) = (self.leaf(start), self.leaf(start + n - 1));
        for k in lo..=hi {
            self.nodes[k] = f();
        }

        // Ancestors of a run of leaves are a run on the level above.
        while lo > 0 {
            lo = (lo - 1) / 2;
            hi = (hi - 1) / 2;
            for k in lo..=hi {
                self.update_node(k);
            }
        }
    }

    /// Combines the leaves in `[lo, hi)`; `hi` is capped at the number of leaves.
    ///
    /// An empty range gives the identity.
    pub fn reduce(&self, lo: usize, hi: usize) -> T {
        let hi = hi.min(self.n_leaves);
        let (mut acc_l, mut acc_r) = (self.op.identity(), self.op.identity());
        if lo >= hi {
            return acc_l;
        }

        // Bottom-up walk on 1-based node numbers, where node `k` is `nodes[k - 1]`.
        let (mut l, mut r) = (lo + self.n_leaves, hi + self.n_leaves);
        while l < r {
            if l & 1 == 1 {
                acc_l = self.op.combine(acc_l, self.nodes[l - 1]);
                l += 1;
            }
            if r & 1 == 1 {
                r -= 1;
                acc_r = self.op.combine(self.nodes[r - 1], acc_r);
            }
            l >>= 1;
            r >>= 1;
        }

        self.op.combine(acc_l, acc_r)
    }

    /// Returns the largest `i` such that `pred` holds on the combination of
    /// leaves `[0, i)`, capped at `limit - 1`.
    ///
    /// `pred` must be monotone: once it fails for a prefix, it fails for every
    /// longer prefix. On a sum tree, `|v| v <= mass` gives the leaf where the
    /// cumulative sum crosses `mass`.
    pub fn largest_region_index<P>(&self, pred: P, limit: usize) -> usize
    where
        P: Fn(T) -> bool,
    {
        let mut k = 0;
        let mut acc = self.op.identity();
        while k < self.n_leaves - 1 {
            let left = 2 * k + 1;
            let v = self.op.combine(acc, self.nodes[left]);
            if pred(v) {
                acc = v;
                k = left + 1;
            } else {
                k = left;
            }
        }

        let ix = k + 1 - self.n_leaves;
        ix.min(limit.min(self.n_leaves).saturating_sub(1))
    }

    /// Sets every node to `value`.
    ///
    /// Pass the identity of the reduction to empty the tree.
    pub fn clear(&mut self, value: T) {
        self.nodes.iter_mut().for_each(|v| *v = value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use segment_tree::{ops::MinIgnoreNaN, SegmentPoint};

    #[test]
    fn test_sum_tree_odd() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let mut tree = ReductionTree::new(8, Sum).unwrap();
        for (ix, &v) in data.iter().enumerate() {
            tree.set(ix, v).unwrap();
        }

        let get = |s: f32| tree.largest_region_index(|v| v <= s, data.len());
        assert_eq!(get(0.0), 0);
        assert_eq!(get(0.4), 0);
        assert_eq!(get(0.5), 1);
        assert_eq!(get(0.6), 1);
        assert_eq!(get(1.2), 2);
        assert_eq!(get(1.6), 3);
        assert_eq!(get(2.0), 4);
        assert_eq!(get(2.8), 4);
        assert_eq!(get(9.3), 6);
        // past the total mass, capped by the limit
        assert_eq!(get(100.0), 6);
        assert_eq!(tree.largest_region_index(|v| v <= 100.0, 3), 2);
    }

    #[test]
    fn test_reduce_matches_naive() {
        let mut rng = StdRng::seed_from_u64(42);
        let data = (0..13).map(|_| rng.gen::<f64>()).collect::<Vec<_>>();
        let mut sum = ReductionTree::new(data.len(), Sum).unwrap();
        let mut min = ReductionTree::new(data.len(), Min).unwrap();
        assert_eq!(sum.len(), 16);
        for (ix, &v) in data.iter().enumerate() {
            sum.set(ix, v).unwrap();
            min.set(ix, v).unwrap();
        }

        for lo in 0..data.len() {
            for hi in lo..=data.len() {
                let expected: f64 = data[lo..hi].iter().sum();
                assert!((sum.reduce(lo, hi) - expected).abs() < 1e-12);
                let expected = data[lo..hi].iter().cloned().fold(f64::INFINITY, f64::min);
                assert_eq!(min.reduce(lo, hi), expected);
            }
        }
        assert!((sum.root() - data.iter().sum::<f64>()).abs() < 1e-12);
        assert_eq!(sum.reduce(5, 2), 0.0);
        assert_eq!(min.reduce(20, 30), f64::INFINITY);
    }

    #[test]
    fn test_min_tree_matches_segment_point() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 32;
        let data = (0..n).map(|_| rng.gen::<f32>()).collect::<Vec<_>>();
        let mut tree = ReductionTree::new(n, Min).unwrap();
        let mut reference = SegmentPoint::build(data.clone(), MinIgnoreNaN);
        for (ix, &v) in data.iter().enumerate() {
            tree.set(ix, v).unwrap();
        }

        for _ in 0..200 {
            let ix = rng.gen_range(0..n);
            let v = rng.gen::<f32>();
            tree.set(ix, v).unwrap();
            reference.modify(ix, v);

            let lo = rng.gen_range(0..n);
            let hi = rng.gen_range(lo + 1..=n);
            assert_eq!(tree.reduce(lo, hi), reference.query(lo, hi));
        }
    }

    #[test]
    fn test_set_bulk_wraps_around() {
        let mut tree = ReductionTree::new(8, Sum).unwrap();
        let mut next = 0.0f32;
        tree.set_bulk(
            6,
            || {
                next += 1.0;
                next
            },
            4,
            8,
        )
        .unwrap();

        let leaves = (0..8).map(|i| tree.get(i).unwrap()).collect::<Vec<_>>();
        assert_eq!(leaves, vec![3.0, 4.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
        assert_eq!(tree.root(), 10.0);
        assert_eq!(tree.reduce(0, 2), 7.0);
        assert_eq!(tree.reduce(6, 8), 3.0);

        // every internal node equals the combination of its children
        for k in 0..7 {
            assert_eq!(tree.nodes[k], tree.nodes[2 * k + 1] + tree.nodes[2 * k + 2]);
        }
    }

    #[test]
    fn test_set_bulk_rejects_bad_ranges() {
        let mut tree = ReductionTree::new(4, Sum).unwrap();
        assert!(tree.set_bulk(4, || 1.0f32, 1, 4).is_err());
        assert!(tree.set_bulk(0, || 1.0f32, 5, 4).is_err());
        assert!(tree.set_bulk(0, || 1.0f32, 1, 8).is_err());
        assert!(tree.set_bulk(3, || 1.0f32, 0, 4).is_ok());
        assert_eq!(tree.root(), 0.0);
    }

    #[test]
    fn test_clear() {
        let mut tree = ReductionTree::new(4, Min).unwrap();
        tree.set(2, 0.5f32).unwrap();
        assert_eq!(tree.root(), 0.5);
        tree.clear(f32::INFINITY);
        assert_eq!(tree.root(), f32::INFINITY);
        assert_eq!(tree.get(2).unwrap(), f32::INFINITY);
        assert!(tree.set(4, 1.0).is_err());
    }

    #[test]
    fn test_single_leaf() {
        let mut tree = ReductionTree::new(1, Sum).unwrap();
        tree.set(0, 2.0f32).unwrap();
        assert_eq!(tree.root(), 2.0);
        assert_eq!(tree.reduce(0, 1), 2.0);
        assert_eq!(tree.largest_region_index(|v| v <= 1.0, 1), 0);
    }
}
