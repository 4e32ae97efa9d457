use std::collections::VecDeque;

use serde::Serialize;

use crate::config::DbscanParams;
use crate::digest::Digest;
use crate::index::{BallTree, DEFAULT_LEAF_SIZE};

/// Per-point outcome of one clustering run.
///
/// Cluster ids are only meaningful within the run that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Cluster(usize),
    Noise,
}

impl Label {
    pub fn cluster_id(&self) -> Option<usize> {
        match self {
            Label::Cluster(id) => Some(*id),
            Label::Noise => None,
        }
    }

    pub fn is_noise(&self) -> bool {
        matches!(self, Label::Noise)
    }
}

#[derive(Debug, Clone)]
pub struct PartitionClustering {
    /// One label per input point, same order as the input.
    pub labels: Vec<Label>,
    pub cluster_count: usize,
    pub noise_count: usize,
}

/// DBSCAN over `points` in input order.
///
/// Points are visited in the order given; the first unvisited core point
/// seeds each new cluster, which then grows breadth-first through core
/// points. Border points join the first cluster that reaches them.
pub fn dbscan(points: &[Digest], params: &DbscanParams) -> PartitionClustering {
    dbscan_with_leaf_size(points, params, DEFAULT_LEAF_SIZE)
}

pub fn dbscan_with_leaf_size(
    points: &[Digest],
    params: &DbscanParams,
    leaf_size: usize,
) -> PartitionClustering {
    let index = BallTree::with_leaf_size(points.to_vec(), leaf_size);
    let min_points = params.min_points.max(1);
    let epsilon = params.epsilon;

    let mut labels: Vec<Option<Label>> = vec![None; points.len()];
    let mut next_cluster = 0usize;

    for seed in 0..points.len() {
        if labels[seed].is_some() {
            continue;
        }

        let neighbors = index.radius_query(&points[seed], epsilon);
        if neighbors.len() < min_points {
            // May still be claimed as a border point later.
            labels[seed] = Some(Label::Noise);
            continue;
        }

        let cluster = Label::Cluster(next_cluster);
        next_cluster += 1;
        labels[seed] = Some(cluster);

        let mut queue: VecDeque<usize> = neighbors.into_iter().filter(|&n| n != seed).collect();
        while let Some(current) = queue.pop_front() {
            match labels[current] {
                Some(Label::Noise) => {
                    // Already known to be non-core: border point, no expansion.
                    labels[current] = Some(cluster);
                    continue;
                }
                Some(Label::Cluster(_)) => continue,
                None => {}
            }

            labels[current] = Some(cluster);
            let reach = index.radius_query(&points[current], epsilon);
            if reach.len() >= min_points {
                queue.extend(
                    reach
                        .into_iter()
                        .filter(|&n| !matches!(labels[n], Some(Label::Cluster(_)))),
                );
            }
        }
    }

    let labels: Vec<Label> = labels
        .into_iter()
        .map(|label| label.unwrap_or(Label::Noise))
        .collect();
    let noise_count = labels.iter().filter(|l| l.is_noise()).count();

    PartitionClustering {
        labels,
        cluster_count: next_cluster,
        noise_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::tests::{digest_with_low_bits, ZERO};
    use std::collections::{BTreeSet, HashMap};

    fn digest(hex: &str) -> Digest {
        Digest::parse(hex).unwrap()
    }

    /// Digest with the bits in `bits` set (bit 0 is the lowest).
    fn digest_with_bits(bits: &[u32]) -> Digest {
        let mut value = [0u8; 32];
        for &bit in bits {
            let byte = 31 - (bit / 8) as usize;
            value[byte] |= 1 << (bit % 8);
        }
        let hex: String = value.iter().map(|b| format!("{b:02x}")).collect();
        digest(&hex)
    }

    /// Membership as a set of index sets, independent of label ids.
    fn membership(labels: &[Label]) -> BTreeSet<BTreeSet<usize>> {
        let mut groups: HashMap<usize, BTreeSet<usize>> = HashMap::new();
        for (i, label) in labels.iter().enumerate() {
            if let Label::Cluster(id) = label {
                groups.entry(*id).or_default().insert(i);
            }
        }
        groups.into_values().collect()
    }

    #[test]
    fn close_digests_cluster_and_far_one_is_noise() {
        let points = vec![
            digest(ZERO),
            digest_with_bits(&[0]),
            digest_with_bits(&[1]),
            digest_with_bits(&[0, 1]),
            digest(&digest_with_low_bits(50)),
        ];
        // Far point is 50 bits from ZERO and at least 48 from the others.
        let result = dbscan(&points, &DbscanParams::new(5, 2));

        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.noise_count, 1);
        assert_eq!(result.labels[4], Label::Noise);
        let first = result.labels[0];
        assert!(first.cluster_id().is_some());
        assert!(result.labels[..4].iter().all(|l| *l == first));
    }

    #[test]
    fn fewer_points_than_min_points_is_all_noise() {
        let points = vec![digest(ZERO), digest_with_bits(&[3])];
        let result = dbscan(&points, &DbscanParams::new(10, 3));
        assert_eq!(result.cluster_count, 0);
        assert!(result.labels.iter().all(Label::is_noise));
    }

    #[test]
    fn empty_input_is_valid() {
        let result = dbscan(&[], &DbscanParams::new(10, 2));
        assert!(result.labels.is_empty());
        assert_eq!(result.cluster_count, 0);
    }

    #[test]
    fn border_point_visited_first_joins_later_cluster() {
        // border is 1 bit from core and 2 from other; with epsilon 1 only
        // core has a neighborhood of 3.
        let border = digest_with_bits(&[10, 11]);
        let core = digest_with_bits(&[10]);
        let other = digest_with_bits(&[]);
        let points = vec![border, core, other];
        let result = dbscan(&points, &DbscanParams::new(1, 3));

        // border is visited first and marked noise, then absorbed by core.
        assert_eq!(result.cluster_count, 1);
        assert_eq!(result.noise_count, 0);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[1], result.labels[2]);
    }

    #[test]
    fn border_points_do_not_expand() {
        // a..e differ by one bit per step; with epsilon 1 and min_points 3
        // the ends a and e are border points.
        let a = digest_with_bits(&[]);
        let b = digest_with_bits(&[0]);
        let c = digest_with_bits(&[0, 1]);
        let d = digest_with_bits(&[0, 1, 2]);
        let e = digest_with_bits(&[0, 1, 2, 3]);
        let result = dbscan(&[a, b, c, d, e], &DbscanParams::new(1, 3));

        // a..d form one cluster through cores b, c, d; e is a border of d.
        assert_eq!(result.cluster_count, 1);
        assert!(result.labels.iter().all(|l| *l == result.labels[0]));

        // Breaking the chain leaves the far end as noise.
        let far = digest_with_bits(&[0, 1, 2, 3, 4, 5, 6]);
        let result = dbscan(&[a, b, c, far], &DbscanParams::new(1, 3));
        assert_eq!(result.labels[3], Label::Noise);
        assert_eq!(result.labels[0], result.labels[2]);
    }

    #[test]
    fn separate_groups_get_separate_labels() {
        let group_a: Vec<Digest> = (0..4).map(|b| digest_with_bits(&[b])).collect();
        let group_b: Vec<Digest> = (0..4)
            .map(|b| digest_with_bits(&[100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 200 + b]))
            .collect();
        let mut points = group_a.clone();
        points.extend(group_b.clone());

        let result = dbscan(&points, &DbscanParams::new(4, 2));
        assert_eq!(result.cluster_count, 2);
        assert_ne!(result.labels[0], result.labels[4]);
        assert_eq!(
            membership(&result.labels),
            BTreeSet::from([BTreeSet::from([0, 1, 2, 3]), BTreeSet::from([4, 5, 6, 7])])
        );
    }

    #[test]
    fn reruns_reproduce_membership() {
        let points: Vec<Digest> = (0..60u32)
            .map(|i| digest_with_bits(&[(i % 6) * 40, (i % 6) * 40 + 1 + (i % 3)]))
            .collect();
        let params = DbscanParams::new(3, 3);
        let first = dbscan_with_leaf_size(&points, &params, 4);
        let second = dbscan_with_leaf_size(&points, &params, 4);
        assert_eq!(membership(&first.labels), membership(&second.labels));
        assert_eq!(first.noise_count, second.noise_count);
    }
}
