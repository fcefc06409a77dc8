//! # Slot controller (feature `controller`).
//!
//! Owns one runner per named slot and picks it from the submission's
//! [`Admission`]:
//!
//! - `Queue` ─► [`SequentialRunner`](crate::SequentialRunner)
//! - `Replace` / `Join` ─► [`CoalescingRunner`](crate::CoalescingRunner)
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use taskgate::{Config, Controller, ControllerSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let ctl = Controller::<u32, String>::builder(Config::default()).build();
//!
//!     let banner = ctl
//!         .submit(ControllerSpec::join("banner", |_ctx: CancellationToken| async { Ok(7) }))
//!         .await;
//!     assert_eq!(banner, Ok(7));
//!
//!     ctl.shutdown().await;
//! }
//! ```

pub mod admission;
pub mod config;
pub mod error;
pub mod spec;

mod builder;
mod core;
mod slot;

pub use admission::Admission;
pub use builder::ControllerBuilder;
pub use config::ControllerConfig;
pub use core::Controller;
pub use error::{ControllerError, SubmitError};
pub use spec::ControllerSpec;
