pub mod text;

pub use text::{mileage_value, parse_mileage, parse_price, price_value};
