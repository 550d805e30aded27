//! Duplicate clustering over indexed items.
//!
//! Two algorithms share one output type, [`Clustering`]:
//!
//! * **Batch** ([`cluster_batch`]): a full [`SimilarityMatrix`] is known.
//!   Edges `(i, j)` with `score > threshold` form an undirected graph over
//!   an index arena; each connected component of size > 1 becomes a
//!   [`DuplicateGroup`] whose canonical member is its smallest index.
//!   Result is independent of traversal order.
//!
//! * **Streaming** ([`StreamingDeduper`]): only a queryable
//!   [`NearestNeighborIndex`] is available. Items arrive in order; an item is
//!   inserted into the index only when no kept item scores above the
//!   threshold, otherwise it is mapped to its nearest kept item. Chains of
//!   near-duplicates therefore collapse onto the first kept item; a later
//!   duplicate is never a canonical.
//!
//! Both algorithms compare with strict `>`: a score exactly at the threshold
//! is not a duplicate.

use std::collections::VecDeque;

/// Score placed on the diagonal so an item is never its own neighbour.
pub const SELF_SIMILARITY: f32 = -1.0;

/// Dense, symmetric n × n similarity scores (row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    scores: Vec<f32>,
}

impl SimilarityMatrix {
    /// An n × n matrix with every entry, diagonal included, at [`SELF_SIMILARITY`].
    pub fn new(n: usize) -> Self {
        Self {
            n,
            scores: vec![SELF_SIMILARITY; n * n],
        }
    }

    /// Build from explicit rows. Returns `None` unless the rows are square.
    /// The diagonal is overwritten with [`SELF_SIMILARITY`].
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|r| r.len() != n) {
            return None;
        }
        let mut m = Self {
            n,
            scores: rows.into_iter().flatten().collect(),
        };
        for i in 0..n {
            m.scores[i * n + i] = SELF_SIMILARITY;
        }
        Some(m)
    }

    /// Pairwise cosine similarity of `embeddings`. A `None` embedding is
    /// similar to nothing.
    pub fn cosine(embeddings: &[Option<Vec<f32>>]) -> Self {
        let n = embeddings.len();
        let mut m = Self::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                if let (Some(a), Some(b)) = (&embeddings[i], &embeddings[j]) {
                    m.set(i, j, cosine_similarity(a, b));
                }
            }
        }
        m
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.scores[i * self.n + j]
    }

    /// Set the score of the unordered pair `{i, j}`. Diagonal writes are ignored.
    pub fn set(&mut self, i: usize, j: usize, score: f32) {
        if i == j {
            return;
        }
        self.scores[i * self.n + j] = score;
        self.scores[j * self.n + i] = score;
    }
}

/// Cosine similarity.
///
/// Two zero vectors (of any length, empty included) are identical and score
/// 1.0. A zero vector against a non-zero one scores 0.0, as do vectors of
/// different non-zero lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// One connected set of near-duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    /// The kept representative.
    pub canonical: usize,
    /// Ascending indices mapped onto `canonical`.
    pub duplicates: Vec<usize>,
}

/// Keep/duplicate decision for every item `0..len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    duplicate_of: Vec<Option<usize>>,
    groups: Vec<DuplicateGroup>,
}

impl Clustering {
    fn from_groups(len: usize, mut groups: Vec<DuplicateGroup>) -> Self {
        groups.sort_by_key(|g| g.canonical);
        let mut duplicate_of = vec![None; len];
        for g in &groups {
            for &d in &g.duplicates {
                duplicate_of[d] = Some(g.canonical);
            }
        }
        Self {
            duplicate_of,
            groups,
        }
    }

    /// Number of items clustered.
    pub fn len(&self) -> usize {
        self.duplicate_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.duplicate_of.is_empty()
    }

    /// Groups ordered by canonical index.
    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    /// Canonical item `i` duplicates, or `None` when `i` is kept.
    pub fn duplicate_of(&self, i: usize) -> Option<usize> {
        self.duplicate_of.get(i).copied().flatten()
    }

    pub fn is_kept(&self, i: usize) -> bool {
        self.duplicate_of(i).is_none()
    }

    /// Kept indices (canonicals and singletons), ascending.
    pub fn kept(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_kept(i)).collect()
    }

    /// `(duplicate, canonical)` pairs, ascending by duplicate.
    pub fn duplicate_pairs(&self) -> Vec<(usize, usize)> {
        self.duplicate_of
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|c| (i, c)))
            .collect()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_of.iter().filter(|c| c.is_some()).count()
    }
}

// ── Batch ────────────────────────────────────────────────────────────────

/// Connected-component clustering of a full similarity matrix.
pub fn cluster_batch(matrix: &SimilarityMatrix, threshold: f32) -> Clustering {
    let n = matrix.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if matrix.get(i, j) > threshold {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }

    let mut visited = vec![false; n];
    let mut groups = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut component = Vec::new();
        while let Some(u) = queue.pop_front() {
            component.push(u);
            for &v in &adjacency[u] {
                if !visited[v] {
                    visited[v] = true;
                    queue.push_back(v);
                }
            }
        }
        if component.len() > 1 {
            component.sort_unstable();
            groups.push(DuplicateGroup {
                canonical: component[0],
                duplicates: component[1..].to_vec(),
            });
        }
    }

    Clustering::from_groups(n, groups)
}

// ── Streaming ────────────────────────────────────────────────────────────

/// Best match returned by a [`NearestNeighborIndex`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position inside the index (0 = first inserted).
    pub slot: usize,
    pub score: f32,
}

/// An index that can be grown and queried for the single nearest entry.
pub trait NearestNeighborIndex {
    type Item;

    /// Nearest stored entry, or `None` when the index is empty.
    fn nearest(&self, item: &Self::Item) -> Option<Neighbor>;

    /// Append an entry; it receives slot `len()` before the call.
    fn insert(&mut self, item: Self::Item);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Brute-force cosine index over dense vectors.
#[derive(Debug, Clone, Default)]
pub struct ExactCosineIndex {
    vectors: Vec<Vec<f32>>,
}

impl ExactCosineIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NearestNeighborIndex for ExactCosineIndex {
    type Item = Vec<f32>;

    fn nearest(&self, item: &Vec<f32>) -> Option<Neighbor> {
        self.vectors
            .iter()
            .enumerate()
            .map(|(slot, v)| Neighbor {
                slot,
                score: cosine_similarity(item, v),
            })
            // First slot wins ties.
            .fold(None, |best: Option<Neighbor>, cand| match best {
                Some(b) if b.score >= cand.score => Some(b),
                _ => Some(cand),
            })
    }

    fn insert(&mut self, item: Vec<f32>) {
        self.vectors.push(item);
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

/// Decision for one streamed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Item was inserted into the index.
    Kept { index: usize },
    /// Item duplicates the kept item `of`.
    Duplicate { index: usize, of: usize },
}

/// Online deduplication against previously kept items only.
pub struct StreamingDeduper<I: NearestNeighborIndex> {
    index: I,
    threshold: f32,
    /// Item index of each index slot.
    slot_items: Vec<usize>,
    decisions: Vec<Decision>,
}

impl<I: NearestNeighborIndex> StreamingDeduper<I> {
    pub fn new(index: I, threshold: f32) -> Self {
        Self {
            index,
            threshold,
            slot_items: Vec::new(),
            decisions: Vec::new(),
        }
    }

    /// Offer the next item. Its index is the number of items offered before it.
    pub fn push(&mut self, item: I::Item) -> Decision {
        let index = self.decisions.len();
        let decision = match self.index.nearest(&item) {
            Some(n) if n.score > self.threshold => Decision::Duplicate {
                index,
                of: self.slot_items[n.slot],
            },
            _ => {
                self.index.insert(item);
                self.slot_items.push(index);
                Decision::Kept { index }
            }
        };
        self.decisions.push(decision);
        decision
    }

    /// Finish and return the clustering of everything pushed.
    pub fn finish(self) -> Clustering {
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        // slot order == ascending canonical order
        let mut group_of_canonical = vec![None; self.decisions.len()];
        for d in &self.decisions {
            if let Decision::Duplicate { index, of } = *d {
                let g = *group_of_canonical[of].get_or_insert_with(|| {
                    groups.push(DuplicateGroup {
                        canonical: of,
                        duplicates: Vec::new(),
                    });
                    groups.len() - 1
                });
                groups[g].duplicates.push(index);
            }
        }
        Clustering::from_groups(self.decisions.len(), groups)
    }
}
