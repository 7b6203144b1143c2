//! Core composition logic: values, placeholders, components, recipes.

pub mod component;
pub mod path;
pub mod placeholder;
pub mod recipe;
pub mod value;
