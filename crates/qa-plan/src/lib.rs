//! qa-plan - Query dimension planning
//!
//! Decides, per query and conversation context, which retrieval
//! dimensions (semantic, lexical, temporal) to run.
//!
//! # Features
//!
//! - Language-model judgment with an explicit timeout
//! - Lenient decoding of the model's reply (fences, prose, single quotes,
//!   bare keys, trailing commas, title-case literals)
//! - Deterministic rule-based fallback
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_plan::DimensionPlanner;
//! use std::sync::Arc;
//!
//! let planner = DimensionPlanner::new(Arc::new(model), config.planner.clone());
//! let plan = planner.plan("老师在10:00到11:00之间说了什么", None).await;
//! if planner.should_search(&plan) {
//!     // run plan.dimensions_by_priority()
//! }
//! ```

mod decode;
mod planner;

pub use decode::{decode_plan, repair_json, DecodeError};
pub use planner::{build_prompt, mentions_time, rule_based_plan, DimensionPlanner};
