pub mod balance;
pub mod stats;

pub use balance::score;
