pub mod analysis;
pub mod cookies;
