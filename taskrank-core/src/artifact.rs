//! On-disk scoring artifact: a decision-forest classifier plus the feature
//! ordering it was trained with.
//!
//! Model file layout (JSON):
//!
//! ```json
//! {
//!   "classes": [1.0, 2.0, 3.0],
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 0, "threshold": 7.5, "left": 1, "right": 2 },
//!         { "leaf": [0.0, 1.0, 9.0] },
//!         { "leaf": [6.0, 2.0, 0.0] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A split sends `x[feature] <= threshold` left. Leaves hold one weight per
//! class. Prediction averages the normalised leaf distributions over all trees
//! and returns the class with the highest mean; the first class wins ties.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArtifactError, ScoreError};
use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::scorer::Scorer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: Vec<f64>,
    },
}

impl Node {
    pub fn split(feature: usize, threshold: f64, left: usize, right: usize) -> Self {
        Self::Split {
            feature,
            threshold,
            left,
            right,
        }
    }

    pub fn leaf(weights: impl Into<Vec<f64>>) -> Self {
        Self::Leaf {
            leaf: weights.into(),
        }
    }
}

/// One decision tree; the root is node 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Walk to a leaf. Validation guarantees children point forward, so this
    /// terminates.
    fn leaf_for(&self, x: &[f64; FEATURE_COUNT]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if x[*feature] <= *threshold { *left } else { *right },
                Node::Leaf { leaf } => return leaf,
            }
        }
    }
}

/// A validated forest. Decoding goes through [`ForestModel::new`], so a
/// structurally broken forest never deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawForest")]
pub struct ForestModel {
    classes: Vec<f64>,
    trees: Vec<Tree>,
}

/// Wire shape of a model file before validation.
#[derive(Deserialize)]
struct RawForest {
    classes: Vec<f64>,
    trees: Vec<Tree>,
}

impl TryFrom<RawForest> for ForestModel {
    type Error = ArtifactError;

    fn try_from(raw: RawForest) -> Result<Self, Self::Error> {
        Self::new(raw.classes, raw.trees)
    }
}

impl ForestModel {
    pub fn new(classes: Vec<f64>, trees: Vec<Tree>) -> Result<Self, ArtifactError> {
        let model = Self { classes, trees };
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawForest = serde_json::from_str(&raw).map_err(|source| ArtifactError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Self::try_from(raw)
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.classes.is_empty() {
            return Err(ArtifactError::Malformed("no classes".into()));
        }
        if self.trees.is_empty() {
            return Err(ArtifactError::Malformed("no trees".into()));
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ArtifactError::Malformed(format!("tree {t} has no nodes")));
            }
            let n = tree.nodes.len();
            for (i, node) in tree.nodes.iter().enumerate() {
                match node {
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if *feature >= FEATURE_COUNT {
                            return Err(ArtifactError::Malformed(format!(
                                "tree {t} node {i}: feature index {feature} out of range"
                            )));
                        }
                        if !threshold.is_finite() {
                            return Err(ArtifactError::Malformed(format!(
                                "tree {t} node {i}: non-finite threshold"
                            )));
                        }
                        // Children must point forward; this rules out loops.
                        for child in [*left, *right] {
                            if child <= i || child >= n {
                                return Err(ArtifactError::Malformed(format!(
                                    "tree {t} node {i}: bad child index {child}"
                                )));
                            }
                        }
                    }
                    Node::Leaf { leaf } => {
                        if leaf.len() != self.classes.len() {
                            return Err(ArtifactError::Malformed(format!(
                                "tree {t} node {i}: {} weights for {} classes",
                                leaf.len(),
                                self.classes.len()
                            )));
                        }
                        if leaf.iter().any(|w| !w.is_finite() || *w < 0.0)
                            || leaf.iter().sum::<f64>() <= 0.0
                        {
                            return Err(ArtifactError::Malformed(format!(
                                "tree {t} node {i}: leaf weights must be non-negative with a positive sum"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Mean class distribution over all trees.
    pub fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ScoreError> {
        let x = features.as_array();
        if let Some(index) = x.iter().position(|v| !v.is_finite()) {
            return Err(ScoreError::NonFiniteInput {
                index,
                name: FEATURE_NAMES[index],
            });
        }

        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let leaf = tree.leaf_for(x);
            let total: f64 = leaf.iter().sum();
            for (p, w) in proba.iter_mut().zip(leaf) {
                *p += w / total;
            }
        }
        let n = self.trees.len() as f64;
        for p in &mut proba {
            *p /= n;
        }
        Ok(proba)
    }
}

impl Scorer for ForestModel {
    fn score(&self, features: &FeatureVector) -> Result<f64, ScoreError> {
        let proba = self.predict_proba(features)?;

        let mut best: Option<(usize, f64)> = None;
        for (i, p) in proba.iter().copied().enumerate() {
            match best {
                Some((_, bp)) if p <= bp => {}
                _ => best = Some((i, p)),
            }
        }

        let (idx, _) = best.ok_or(ScoreError::NoPrediction)?;
        let class = self.classes[idx];
        debug!(?proba, class, "forest prediction");
        Ok(class)
    }
}

/// Read the feature ordering list that ships next to the model.
pub fn load_feature_names(path: &Path) -> Result<Vec<String>, ArtifactError> {
    let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Compare an artifact's feature ordering with the extractor's.
pub fn check_feature_order(names: &[String]) -> Result<(), String> {
    if names.len() != FEATURE_COUNT {
        return Err(format!(
            "artifact lists {} features, extractor produces {FEATURE_COUNT}",
            names.len()
        ));
    }
    let mismatched: Vec<String> = names
        .iter()
        .zip(FEATURE_NAMES)
        .enumerate()
        .filter(|(_, (got, want))| got.as_str() != *want)
        .map(|(i, (got, want))| format!("#{i}: artifact '{got}' vs extractor '{want}'"))
        .collect();

    if mismatched.is_empty() {
        Ok(())
    } else {
        Err(mismatched.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Urgent (few days left) tasks land in class 3, the rest in class 1.
    fn stump(threshold: f64) -> Tree {
        Tree::new(vec![
            Node::split(0, threshold, 1, 2),
            Node::leaf([0.0, 1.0, 9.0]),
            Node::leaf([8.0, 2.0, 0.0]),
        ])
    }

    fn v(days_left: f64, urgency: f64) -> FeatureVector {
        FeatureVector::new([days_left, urgency, 0.0, 0.5, 0.0])
    }

    #[test]
    fn single_tree_follows_split() {
        let model = ForestModel::new(vec![1.0, 2.0, 3.0], vec![stump(7.0)]).unwrap();
        assert_eq!(model.score(&v(3.0, 5.0)), Ok(3.0));
        assert_eq!(model.score(&v(7.0, 5.0)), Ok(3.0));
        assert_eq!(model.score(&v(30.0, 5.0)), Ok(1.0));
    }

    #[test]
    fn forest_averages_trees() {
        let by_urgency = Tree::new(vec![
            Node::split(1, 5.0, 1, 2),
            Node::leaf([0.0, 10.0, 0.0]),
            Node::leaf([0.0, 0.0, 10.0]),
        ]);
        let model =
            ForestModel::new(vec![1.0, 2.0, 3.0], vec![stump(7.0), by_urgency.clone(), by_urgency])
                .unwrap();

        // Two of three trees vote class 2 on low urgency.
        assert_eq!(model.score(&v(3.0, 2.0)), Ok(2.0));
        let proba = model.predict_proba(&v(3.0, 2.0)).unwrap();
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ties_go_to_first_class() {
        let model = ForestModel::new(vec![1.0, 2.0], vec![Tree::new(vec![Node::leaf([1.0, 1.0])])])
            .unwrap();
        assert_eq!(model.score(&v(0.0, 0.0)), Ok(1.0));
    }

    #[test]
    fn non_finite_input_is_a_scoring_error() {
        let model = ForestModel::new(vec![1.0, 2.0, 3.0], vec![stump(7.0)]).unwrap();
        let err = model.score(&v(f64::NAN, 1.0)).unwrap_err();
        assert_eq!(
            err,
            ScoreError::NonFiniteInput {
                index: 0,
                name: "days_left"
            }
        );
    }

    #[test]
    fn rejects_structural_problems() {
        let classes = vec![1.0, 2.0];
        let cases = vec![
            (vec![], vec![Tree::new(vec![Node::leaf([1.0])])]),
            (classes.clone(), vec![]),
            (classes.clone(), vec![Tree::new(vec![])]),
            (classes.clone(), vec![Tree::new(vec![Node::leaf([1.0])])]),
            (classes.clone(), vec![Tree::new(vec![Node::leaf([0.0, 0.0])])]),
            (
                classes.clone(),
                vec![Tree::new(vec![Node::split(9, 1.0, 1, 2), Node::leaf([1.0, 0.0]), Node::leaf([0.0, 1.0])])],
            ),
            (
                classes.clone(),
                vec![Tree::new(vec![Node::split(0, 1.0, 0, 1), Node::leaf([1.0, 0.0])])],
            ),
            (
                classes,
                vec![Tree::new(vec![Node::split(0, 1.0, 1, 5), Node::leaf([1.0, 0.0])])],
            ),
        ];
        for (classes, trees) in cases {
            assert!(
                matches!(ForestModel::new(classes, trees), Err(ArtifactError::Malformed(_))),
                "expected malformed"
            );
        }
    }

    #[test]
    fn load_reads_json_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(
            &path,
            r#"{"classes":[1,2,3],"trees":[{"nodes":[
                {"feature":0,"threshold":7.5,"left":1,"right":2},
                {"leaf":[0,1,9]},
                {"leaf":[6,2,0]}
            ]}]}"#,
        )
        .unwrap();

        let model = ForestModel::load(&path).unwrap();
        assert_eq!(model.tree_count(), 1);
        assert_eq!(model.score(&v(2.0, 1.0)), Ok(3.0));
    }

    #[test]
    fn decoding_validates_structure() {
        let dangling = r#"{"classes":[1,2],"trees":[{"nodes":[
            {"feature":0,"threshold":1.0,"left":1,"right":5},
            {"leaf":[1,0]}
        ]}]}"#;
        let err = serde_json::from_str::<ForestModel>(dangling).unwrap_err();
        assert!(err.to_string().contains("bad child index 5"), "{err}");

        let looping = r#"{"classes":[1,2],"trees":[{"nodes":[
            {"feature":0,"threshold":1.0,"left":1,"right":2},
            {"feature":1,"threshold":1.0,"left":0,"right":2},
            {"leaf":[1,0]}
        ]}]}"#;
        assert!(serde_json::from_str::<ForestModel>(looping).is_err());

        let model = ForestModel::new(vec![1.0, 2.0, 3.0], vec![stump(7.0)]).unwrap();
        let round_trip: ForestModel =
            serde_json::from_str(&serde_json::to_string(&model).unwrap()).unwrap();
        assert_eq!(round_trip, model);
    }

    #[test]
    fn load_reports_structural_problems_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, r#"{"classes":[1],"trees":[]}"#).unwrap();
        assert!(matches!(ForestModel::load(&path), Err(ArtifactError::Malformed(_))));
    }

    #[test]
    fn load_reports_io_and_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ForestModel::load(&dir.path().join("missing.json")),
            Err(ArtifactError::Io { .. })
        ));

        let garbled = dir.path().join("garbled.json");
        fs::write(&garbled, "not json").unwrap();
        assert!(matches!(ForestModel::load(&garbled), Err(ArtifactError::Json { .. })));
    }

    #[test]
    fn feature_order_check() {
        let canonical: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        assert!(check_feature_order(&canonical).is_ok());

        let swapped: Vec<String> = ["urgency_score", "days_left", "normalized_urgency", "dependency_count", "status_overdue"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mismatch = check_feature_order(&swapped).unwrap_err();
        assert!(mismatch.contains("#0"));
        assert!(mismatch.contains("#3"));
        assert!(!mismatch.contains("#4"));

        assert!(check_feature_order(&canonical[..3]).is_err());
    }
}
