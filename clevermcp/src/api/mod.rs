pub mod server;
pub mod tls;

pub use server::{ApiServer, AppState};
