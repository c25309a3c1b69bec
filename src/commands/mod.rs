pub mod apply;
pub mod schema;
