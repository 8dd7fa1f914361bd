//! Built-in producer and evaluator implementations.

mod model;
mod rubric;
mod template;

pub use model::{ModelEvaluator, ModelProducer};
pub use rubric::RubricEvaluator;
pub use template::TemplateProducer;
