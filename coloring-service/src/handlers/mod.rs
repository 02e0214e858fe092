pub mod generate;
pub mod health;

pub use generate::{
    generate, idea_from_query, method_not_allowed, panic_response, MISSING_IDEA_MESSAGE,
};
pub use health::{health_check, metrics};
