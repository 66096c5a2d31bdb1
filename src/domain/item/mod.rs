pub mod entity;
pub mod invariants;

pub use entity::Item;
pub use invariants::validate_items;
