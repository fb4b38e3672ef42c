pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod settings;

pub use controller::{init_kube_client, EdgeOperator};
pub use error::{Error, Result};
pub use settings::Settings;
