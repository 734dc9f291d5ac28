mod atomic_write;
pub mod indicatif;
pub mod reqwest;

pub use atomic_write::atomic_write;
