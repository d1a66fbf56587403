// 🔗 Union-Find - Disjoint-set over record indices
// Shared by the spatial and textual clusterers: pairwise "same unit"
// evidence is unioned, connected components become clusters.
//
// Transitive closure by construction: A~B and B~C put A and C in the
// same set even if A and C were never compared directly.

/// Disjoint-set with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Create a disjoint-set of `n` singleton elements (0..n)
    pub fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Number of elements (not sets)
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Find the representative of `x`, compressing the path
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`
    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        // Union by rank
        if self.rank[ra] < self.rank[rb] {
            self.parent[ra] = rb;
        } else if self.rank[ra] > self.rank[rb] {
            self.parent[rb] = ra;
        } else {
            self.parent[rb] = ra;
            self.rank[ra] += 1;
        }
    }

    /// Check whether `a` and `b` are in the same set
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Extract the sets as sorted groups, ordered by their smallest element.
    ///
    /// Deterministic: the same sequence of unions always produces the same
    /// group list, independent of union order.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.len();
        let mut by_root: std::collections::HashMap<usize, Vec<usize>> =
            std::collections::HashMap::new();

        for x in 0..n {
            let root = self.find(x);
            by_root.entry(root).or_default().push(x);
        }

        // 0..n insertion order keeps each group sorted ascending already
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_by_key(|g| g[0]);
        groups
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons_without_unions() {
        let mut uf = UnionFind::new(3);
        assert_eq!(uf.groups(), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_transitive_chain() {
        let mut uf = UnionFind::new(4);
        uf.union(0, 1);
        uf.union(1, 2);

        assert!(uf.connected(0, 2));
        assert!(!uf.connected(0, 3));
        assert_eq!(uf.groups(), vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn test_union_is_idempotent() {
        let mut uf = UnionFind::new(3);
        uf.union(0, 2);
        uf.union(2, 0);
        uf.union(0, 2);

        assert_eq!(uf.groups(), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_groups_ordered_by_smallest_member() {
        let mut uf = UnionFind::new(5);
        uf.union(4, 1);
        uf.union(3, 2);

        assert_eq!(uf.groups(), vec![vec![0], vec![1, 4], vec![2, 3]]);
    }
}
