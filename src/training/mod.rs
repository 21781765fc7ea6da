//! Classification engines
//!
//! Self-contained estimators working on dense `ndarray` matrices with a 0/1
//! outcome:
//! - [`LogisticRegression`]: elastic-net logistic regression (plain, lasso)
//! - [`DecisionTree`]: CART with Gini splits and cost-complexity pruning
//! - [`RandomForest`]: bagged probability trees with per-split feature sampling

pub mod decision_tree;
pub mod linear_models;
pub mod models;
pub mod random_forest;

pub use decision_tree::{DecisionTree, TreeNode};
pub use linear_models::LogisticRegression;
pub use models::Classifier;
pub use random_forest::{MaxFeatures, RandomForest};
