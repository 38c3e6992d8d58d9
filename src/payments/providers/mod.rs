pub mod mock;
pub mod stripe;

pub use mock::{MockGateway, MockOperation, MockStep};
pub use stripe::{StripeConfig, StripeGateway};
