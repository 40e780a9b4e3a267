pub mod db;
pub mod persistence;

pub use persistence::{Persistence, SystemStatus};
