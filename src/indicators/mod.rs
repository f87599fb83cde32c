// Technical indicators module
pub mod adx;

pub use adx::{calculate_adx, Adx};
