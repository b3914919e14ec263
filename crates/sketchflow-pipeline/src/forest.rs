//! Disjoint-set forest over flat pixel indices.
//!
//! Parents and ranks live in parallel flat arrays. [`find`](DisjointForest::find)
//! is iterative (two passes: locate the root, then compress the path) so
//! arbitrarily deep trees never touch the call stack.

/// Union-find with path compression and union by rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisjointForest {
    parent: Vec<usize>,
    rank: Vec<u32>,
    components: usize,
}

impl DisjointForest {
    /// One singleton set per element.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
            components: len,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Returns `true` if the forest has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Current number of disjoint sets. Starts at [`len`](Self::len) and
    /// only decreases.
    #[must_use]
    pub const fn components(&self) -> usize {
        self.components
    }

    /// The stored parent pointer of `i`, without compression.
    #[must_use]
    pub fn parent(&self, i: usize) -> usize {
        self.parent[i]
    }

    /// Root of the set containing `i`, compressing the path behind it.
    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Root of the set containing `i` without mutating the forest.
    #[must_use]
    pub fn find_root(&self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        root
    }

    /// Merge the sets containing `a` and `b`.
    ///
    /// The lower-rank root is attached beneath the higher-rank one. On
    /// equal rank, `a`'s root goes beneath `b`'s root and the survivor's
    /// rank grows by one. Returns `false` if both were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let mut x = self.find(a);
        let mut y = self.find(b);
        if x == y {
            return false;
        }
        if self.rank[x] > self.rank[y] {
            std::mem::swap(&mut x, &mut y);
        }
        if self.rank[x] == self.rank[y] {
            self.rank[y] += 1;
        }
        self.parent[x] = y;
        self.components -= 1;
        true
    }

    /// Point every element directly at its root.
    pub fn flatten(&mut self) {
        for i in 0..self.parent.len() {
            let root = self.find(i);
            self.parent[i] = root;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_forest_is_all_singletons() {
        let mut f = DisjointForest::new(5);
        assert_eq!(f.len(), 5);
        assert_eq!(f.components(), 5);
        for i in 0..5 {
            assert_eq!(f.find(i), i);
        }
    }

    #[test]
    fn union_decrements_components_once() {
        let mut f = DisjointForest::new(4);
        assert!(f.union(0, 1));
        assert!(!f.union(1, 0));
        assert_eq!(f.components(), 3);
        assert_eq!(f.find(0), f.find(1));
        assert_ne!(f.find(0), f.find(2));
    }

    #[test]
    fn equal_rank_attaches_first_under_second() {
        let mut f = DisjointForest::new(2);
        f.union(0, 1);
        assert_eq!(f.parent(0), 1);
        assert_eq!(f.find(0), 1);
    }

    #[test]
    fn lower_rank_goes_under_higher_rank() {
        let mut f = DisjointForest::new(3);
        f.union(0, 1); // root 1, rank 1
        f.union(1, 2); // root 1 outranks singleton 2
        assert_eq!(f.find(2), 1);
        assert_eq!(f.find(0), 1);
    }

    #[test]
    fn long_chain_find_compresses_iteratively() {
        let n = 100_000;
        let mut f = DisjointForest::new(n);
        for i in 0..n - 1 {
            f.union(i, i + 1);
        }
        assert_eq!(f.components(), 1);
        let root = f.find(0);
        f.flatten();
        for i in 0..n {
            assert_eq!(f.parent(i), root);
        }
    }

    #[test]
    fn flatten_makes_find_idempotent() {
        let mut f = DisjointForest::new(8);
        f.union(0, 1);
        f.union(2, 3);
        f.union(1, 3);
        f.union(5, 6);
        f.flatten();
        for i in 0..8 {
            let r = f.find_root(i);
            assert_eq!(f.parent(i), r);
            assert_eq!(f.parent(r), r);
            assert_eq!(f.find_root(r), r);
        }
        assert_eq!(f.components(), 4);
    }

    #[test]
    fn empty_forest() {
        let f = DisjointForest::new(0);
        assert!(f.is_empty());
        assert_eq!(f.components(), 0);
    }
}
