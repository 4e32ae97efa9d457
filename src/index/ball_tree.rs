use crate::digest::Digest;

pub const DEFAULT_LEAF_SIZE: usize = 20;

#[derive(Debug)]
enum NodeKind {
    Leaf { members: Vec<usize> },
    Branch { left: usize, right: usize },
}

/// A ball: every point below this node lies within `radius` of `center`.
#[derive(Debug)]
struct Node {
    center: usize,
    radius: u32,
    kind: NodeKind,
}

/// Ball tree over a partition's digests, queried by Hamming radius.
///
/// Centers are always indexed points, so the triangle inequality lets a query
/// skip any ball whose center is farther than `radius + epsilon` away.
#[derive(Debug)]
pub struct BallTree {
    points: Vec<Digest>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl BallTree {
    pub fn build(points: Vec<Digest>) -> Self {
        Self::with_leaf_size(points, DEFAULT_LEAF_SIZE)
    }

    pub fn with_leaf_size(points: Vec<Digest>, leaf_size: usize) -> Self {
        let mut tree = Self {
            points,
            nodes: Vec::new(),
            root: None,
        };

        if !tree.points.is_empty() {
            let all: Vec<usize> = (0..tree.points.len()).collect();
            let root = tree.build_node(all, leaf_size.max(1));
            tree.root = Some(root);
        }

        tree
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indices of all points within `epsilon` of `query`, ascending. A query
    /// taken from the index includes its own index.
    pub fn radius_query(&self, query: &Digest, epsilon: u32) -> Vec<usize> {
        let mut found = Vec::new();
        let Some(root) = self.root else {
            return found;
        };

        let mut stack = vec![root];
        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            let to_center = query.distance(&self.points[node.center]);
            if to_center > node.radius.saturating_add(epsilon) {
                continue;
            }

            match &node.kind {
                NodeKind::Leaf { members } => {
                    found.extend(
                        members
                            .iter()
                            .copied()
                            .filter(|&m| query.distance(&self.points[m]) <= epsilon),
                    );
                }
                NodeKind::Branch { left, right } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }

        found.sort_unstable();
        found
    }

    fn build_node(&mut self, members: Vec<usize>, leaf_size: usize) -> usize {
        let seed = members[0];

        if members.len() <= leaf_size {
            return self.push_leaf(seed, members);
        }

        // Two far-apart pivots: farthest from the seed, then farthest from that.
        let left_pivot = self.farthest_from(seed, &members);
        let right_pivot = self.farthest_from(left_pivot, &members);
        if self.points[left_pivot].distance(&self.points[right_pivot]) == 0 {
            // All members are identical; splitting cannot make progress.
            return self.push_leaf(seed, members);
        }

        let radius = self.radius_around(left_pivot, &members);
        let (left_members, right_members): (Vec<usize>, Vec<usize>) =
            members.into_iter().partition(|&m| {
                let point = &self.points[m];
                point.distance(&self.points[left_pivot]) <= point.distance(&self.points[right_pivot])
            });

        let left = self.build_node(left_members, leaf_size);
        let right = self.build_node(right_members, leaf_size);

        self.nodes.push(Node {
            center: left_pivot,
            radius,
            kind: NodeKind::Branch { left, right },
        });
        self.nodes.len() - 1
    }

    fn push_leaf(&mut self, center: usize, members: Vec<usize>) -> usize {
        let radius = self.radius_around(center, &members);
        self.nodes.push(Node {
            center,
            radius,
            kind: NodeKind::Leaf { members },
        });
        self.nodes.len() - 1
    }

    fn farthest_from(&self, origin: usize, members: &[usize]) -> usize {
        let origin_point = &self.points[origin];
        let mut best = origin;
        let mut best_distance = 0;
        for &m in members {
            let d = origin_point.distance(&self.points[m]);
            if d > best_distance {
                best = m;
                best_distance = d;
            }
        }
        best
    }

    fn radius_around(&self, center: usize, members: &[usize]) -> u32 {
        let center_point = &self.points[center];
        members
            .iter()
            .map(|&m| center_point.distance(&self.points[m]))
            .max()
            .unwrap_or(0)
    }
}
