pub mod bronze;
pub mod silver;

pub use bronze::BronzeReader;
pub use silver::SilverReader;
