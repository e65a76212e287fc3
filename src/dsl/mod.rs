//! The two whitelisted document compilers an LLM-generated or
//! operator-supplied policy description is reduced to: a reward arithmetic
//! expression and a prior-policy operation sum.

pub mod prior;
pub mod safe_expr;

pub use prior::{compile as compile_prior_doc, CompiledPrior, PriorDocument, PriorTerm};
pub use safe_expr::{compile_reward_expr, CompiledExpr, RewardClamp, RewardDocument, RewardMetrics};
