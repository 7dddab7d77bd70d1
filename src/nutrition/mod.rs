pub mod loader;
pub mod source;

pub use loader::{load_nutrition, DuplicateCodePolicy, NutritionEntry, NutritionLayout, NutritionTable};
pub use source::NutritionSource;
