pub mod encounter;
pub mod history;
