pub mod kis_client;
pub mod realtime;

pub use kis_client::KisClient;
