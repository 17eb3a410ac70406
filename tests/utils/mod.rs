pub mod actions;
pub mod assertions;
pub mod clients;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::{assert_app_error, LiveAssertion};
#[allow(unused_imports)]
pub use clients::LiveClient;
#[allow(unused_imports)]
pub use setup::{identity, parameters, TestSetup, TestSetupBuilder};
