//! Jenkins REST implementation of the cdprobe client traits.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use cdprobe_jenkins::{JenkinsClient, JenkinsConfig};
//!
//! let client = JenkinsClient::new(JenkinsConfig::from_env()?)?;
//! let build = cdprobe_core::trigger_and_wait_for_finish(
//!     &client,
//!     "demo/build",
//!     std::time::Duration::from_secs(20),
//!     std::time::Duration::from_secs(600),
//! )
//! .await?;
//! println!("{}", cdprobe_core::classify_result(&build));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;

pub use client::JenkinsClient;
pub use config::{JenkinsAuth, JenkinsConfig};
