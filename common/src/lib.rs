//! Allergen Scout Common Library
//!
//! I/Oを持たない共通ロジック: 食材リゾルバ、スコアリング、合議、
//! プロンプト生成、プロバイダレスポンスの検証

pub mod types;
pub mod error;
pub mod mappings;
pub mod resolver;
pub mod similarity;
pub mod scoring;
pub mod consensus;
pub mod prompts;
pub mod parser;

pub use types::{
    AllergenAnalysis, CurrentConclusion, DishAnalysis, IngredientAnalysis, MatchCandidate,
    RecipeRecord, Usage, UsageNote,
};
pub use error::{Error, Result};
pub use mappings::{IngredientMapping, MappingTables};
pub use resolver::{AllergenMatches, IngredientResolver};
pub use scoring::{
    aggregate_allergens, canonical_allergens, combined_score, fuzzy_dish_match, round2,
    score_ingredients, AllergenHits, AllergenStats, MatchThresholds,
};
pub use consensus::{pick_consensus, Consensus};
pub use prompts::{build_dish_prompt, build_ingredient_prompt};
pub use parser::{extract_json, parse_dish_analysis, parse_ingredient_analysis};
