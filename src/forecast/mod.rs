pub mod dispatcher;
pub mod engine;
pub mod external;
pub mod statistical;

pub use dispatcher::{run_invocation, ForecastDispatcher};
pub use external::ExternalModelClient;
