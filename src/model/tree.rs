//! Least-squares regression tree with exact greedy splits.
//!
//! Split selection is deterministic: candidates are scanned in feature
//! order, then in ascending threshold order, and only a strictly larger
//! gain replaces the current best.

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Fits on the `rows` subset of `x`/`y`, considering only `features`.
    pub fn fit(x: &[Vec<f64>], y: &[f64], rows: &[usize], features: &[usize], params: TreeParams) -> Self {
        let mut tree = Self::default();
        tree.build_node(x, y, rows.to_vec(), features, 0, params);
        tree
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn build_node(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        rows: Vec<usize>,
        features: &[usize],
        depth: usize,
        params: TreeParams,
    ) -> usize {
        let idx = self.nodes.len();
        let mean = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
        };
        self.nodes.push(Node::Leaf { value: mean });

        let min_leaf = params.min_samples_leaf.max(1);
        if depth >= params.max_depth || rows.len() < 2 * min_leaf {
            return idx;
        }
        let Some(split) = best_split(x, y, &rows, features, min_leaf) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[r][split.feature] <= split.threshold);

        let left = self.build_node(x, y, left_rows, features, depth + 1, params);
        let right = self.build_node(x, y, right_rows, features, depth + 1, params);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    rows: &[usize],
    features: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&r| y[r]).sum();
    let parent_score = total * total / n as f64;
    let mut best: Option<SplitCandidate> = None;

    let mut sorted = rows.to_vec();
    for &feature in features {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]).then(a.cmp(&b)));

        let mut left_sum = 0.0;
        for i in 1..n {
            left_sum += y[sorted[i - 1]];
            if i < min_leaf || n - i < min_leaf {
                continue;
            }
            let lo = x[sorted[i - 1]][feature];
            let hi = x[sorted[i]][feature];
            if lo == hi {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / i as f64 + right_sum * right_sum / (n - i) as f64 - parent_score;
            if gain <= 1e-12 {
                continue;
            }
            if best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: lo + (hi - lo) / 2.0,
                    gain,
                });
            }
        }
    }

    best
}
