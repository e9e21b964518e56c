use serde::Serialize;

use super::detector::RawDetection;

/// A group of overlapping raw detections
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusteredDetection {
    /// Center row of the strongest member
    pub row: f32,
    /// Center column of the strongest member
    pub col: f32,
    /// Window edge of the strongest member
    pub scale: f32,
    /// Sum of member scores
    pub score: f32,
    /// Number of raw detections merged into this one
    pub members: usize,
}

impl From<RawDetection> for ClusteredDetection {
    fn from(det: RawDetection) -> Self {
        Self {
            row: det.row,
            col: det.col,
            scale: det.scale,
            score: det.score,
            members: 1,
        }
    }
}

/// Anything with a square window centered at (row, col)
pub trait Window {
    fn center(&self) -> (f32, f32);
    fn edge(&self) -> f32;
    fn score(&self) -> f32;
}

impl Window for RawDetection {
    fn center(&self) -> (f32, f32) {
        (self.row, self.col)
    }

    fn edge(&self) -> f32 {
        self.scale
    }

    fn score(&self) -> f32 {
        self.score
    }
}

impl Window for ClusteredDetection {
    fn center(&self) -> (f32, f32) {
        (self.row, self.col)
    }

    fn edge(&self) -> f32 {
        self.scale
    }

    fn score(&self) -> f32 {
        self.score
    }
}

/// Intersection over union of two square windows
pub fn window_iou<A: Window, B: Window>(a: &A, b: &B) -> f32 {
    let ((r1, c1), s1) = (a.center(), a.edge());
    let ((r2, c2), s2) = (b.center(), b.edge());

    let over_row = (r1 + s1 / 2.0).min(r2 + s2 / 2.0) - (r1 - s1 / 2.0).max(r2 - s2 / 2.0);
    let over_col = (c1 + s1 / 2.0).min(c2 + s2 / 2.0) - (c1 - s1 / 2.0).max(c2 - s2 / 2.0);

    let intersection = over_row.max(0.0) * over_col.max(0.0);
    let union = s1 * s1 + s2 * s2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Merge detections whose windows overlap by more than `iou_threshold`.
///
/// Overlap is transitive: A~B and B~C put all three in one cluster even if
/// A and C are disjoint. A threshold of 0 merges anything with positive
/// overlap. Clusters come out in order of their earliest member; each
/// takes the position of its highest-scoring member (earliest on ties) and
/// the sum of all member scores.
pub fn cluster_detections<W: Window>(
    detections: &[W],
    iou_threshold: f32,
) -> Vec<ClusteredDetection> {
    let mut sets = DisjointSet::new(detections.len());

    for i in 0..detections.len() {
        for j in (i + 1)..detections.len() {
            if window_iou(&detections[i], &detections[j]) > iou_threshold {
                sets.union(i, j);
            }
        }
    }

    // Root -> index into `clusters`, assigned when a root is first seen
    let mut slot: Vec<Option<usize>> = vec![None; detections.len()];
    let mut clusters: Vec<ClusteredDetection> = Vec::new();
    let mut best: Vec<f32> = Vec::new();

    for (i, det) in detections.iter().enumerate() {
        let root = sets.find(i);
        let (row, col) = det.center();

        match slot[root] {
            None => {
                slot[root] = Some(clusters.len());
                clusters.push(ClusteredDetection {
                    row,
                    col,
                    scale: det.edge(),
                    score: det.score(),
                    members: 1,
                });
                best.push(det.score());
            }
            Some(k) => {
                let cluster = &mut clusters[k];
                cluster.score += det.score();
                cluster.members += 1;
                if det.score() > best[k] {
                    best[k] = det.score();
                    cluster.row = row;
                    cluster.col = col;
                    cluster.scale = det.edge();
                }
            }
        }
    }

    tracing::debug!(
        raw = detections.len(),
        clusters = clusters.len(),
        iou_threshold,
        "detections clustered"
    );

    clusters
}

/// Union-find with path compression and union by rank
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let parent = self.parent[x];
        if parent == x {
            return x;
        }
        let root = self.find(parent);
        self.parent[x] = root;
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        if self.rank[root_a] < self.rank[root_b] {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b] = root_a;
        if self.rank[root_a] == self.rank[root_b] {
            self.rank[root_a] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(row: f32, col: f32, scale: f32, score: f32) -> RawDetection {
        RawDetection { row, col, scale, score }
    }

    #[test]
    fn test_iou() {
        let a = raw(50.0, 50.0, 20.0, 1.0);
        assert!((window_iou(&a, &a) - 1.0).abs() < 1e-6);

        // Shifted by half an edge: 200 / (400 + 400 - 200)
        let b = raw(50.0, 60.0, 20.0, 1.0);
        assert!((window_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);

        // Touching edges share no area
        let c = raw(50.0, 70.0, 20.0, 1.0);
        assert_eq!(window_iou(&a, &c), 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_detections::<RawDetection>(&[], 0.0).is_empty());
    }

    #[test]
    fn test_single_detection_unchanged() {
        let clusters = cluster_detections(&[raw(10.0, 20.0, 30.0, 4.5)], 0.0);
        assert_eq!(clusters, vec![ClusteredDetection::from(raw(10.0, 20.0, 30.0, 4.5))]);
    }

    #[test]
    fn test_overlapping_merge_to_strongest_member() {
        let dets = [
            raw(100.0, 100.0, 40.0, 1.0),
            raw(104.0, 102.0, 44.0, 3.0),
            raw(98.0, 96.0, 40.0, 2.0),
        ];
        let clusters = cluster_detections(&dets, 0.0);

        assert_eq!(clusters.len(), 1);
        let c = clusters[0];
        assert_eq!((c.row, c.col, c.scale), (104.0, 102.0, 44.0));
        assert!((c.score - 6.0).abs() < 1e-6);
        assert_eq!(c.members, 3);
    }

    #[test]
    fn test_tie_keeps_earliest_member() {
        let dets = [raw(100.0, 100.0, 40.0, 2.0), raw(102.0, 102.0, 40.0, 2.0)];
        let c = cluster_detections(&dets, 0.0)[0];
        assert_eq!((c.row, c.col), (100.0, 100.0));
    }

    #[test]
    fn test_disjoint_detections_stay_separate() {
        let dets = [raw(50.0, 50.0, 40.0, 6.0), raw(200.0, 200.0, 40.0, 7.0)];
        let clusters = cluster_detections(&dets, 0.0);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].score, 6.0);
        assert_eq!(clusters[1].score, 7.0);
    }

    #[test]
    fn test_overlap_is_transitive() {
        // a overlaps b, b overlaps c, a and c are disjoint
        let a = raw(50.0, 50.0, 20.0, 1.0);
        let b = raw(50.0, 65.0, 20.0, 1.0);
        let c = raw(50.0, 80.0, 20.0, 1.0);
        assert_eq!(window_iou(&a, &c), 0.0);

        let clusters = cluster_detections(&[a, c, b], 0.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, 3);
    }

    #[test]
    fn test_threshold_limits_merging() {
        let a = raw(50.0, 50.0, 20.0, 1.0);
        let b = raw(50.0, 60.0, 20.0, 1.0);

        assert_eq!(cluster_detections(&[a, b], 0.0).len(), 1);
        assert_eq!(cluster_detections(&[a, b], 0.3).len(), 1);
        assert_eq!(cluster_detections(&[a, b], 0.5).len(), 2);
    }

    #[test]
    fn test_discovery_order() {
        let dets = [
            raw(300.0, 300.0, 40.0, 1.0),
            raw(50.0, 50.0, 40.0, 9.0),
            raw(302.0, 300.0, 40.0, 5.0),
        ];
        let clusters = cluster_detections(&dets, 0.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].row, 302.0);
        assert_eq!(clusters[1].row, 50.0);
    }

    #[test]
    fn test_clustering_is_idempotent() {
        let dets = [
            raw(100.0, 100.0, 40.0, 1.0),
            raw(110.0, 105.0, 40.0, 2.5),
            raw(300.0, 120.0, 60.0, 4.0),
            raw(310.0, 130.0, 60.0, 0.5),
            raw(500.0, 500.0, 30.0, 3.0),
        ];
        let once = cluster_detections(&dets, 0.0);
        let twice = cluster_detections(&once, 0.0);

        assert_eq!(once.len(), 3);
        let strip = |c: &ClusteredDetection| (c.row, c.col, c.scale, c.score);
        assert_eq!(
            once.iter().map(strip).collect::<Vec<_>>(),
            twice.iter().map(strip).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_cluster_score_at_least_max_member() {
        let dets = [
            raw(100.0, 100.0, 40.0, 0.25),
            raw(101.0, 99.0, 41.0, 3.5),
            raw(99.0, 103.0, 39.0, 0.0),
        ];
        let max = dets.iter().map(|d| d.score).fold(0.0f32, f32::max);
        let clusters = cluster_detections(&dets, 0.0);
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].score >= max);
    }
}
