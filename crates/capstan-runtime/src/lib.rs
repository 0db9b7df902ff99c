//! Embedded script-module runtime bridge.
//!
//! `capstan-runtime` embeds the Wasmtime component engine inside a host
//! process and exposes [`ScriptHost`]: load script modules by name,
//! resolve their exported functions, invoke them with native arguments,
//! and convert the results back into native values, without hand-written
//! marshalling at every call site.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use capstan_runtime::{ScriptHost, dynamic_args, from_dynamic};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let host = ScriptHost::new(None)?;
//! host.initialize(&[]).await?;
//!
//! host.load_module("example").await?;
//! host.load_function("example", "transform").await?;
//!
//! let rows = vec![vec![1i64, 2, 3]; 3];
//! let result = host
//!     .call_function("example", "transform", &dynamic_args![rows, 3.14, true, "testing"])
//!     .await?;
//!
//! if let Some(val) = result {
//!     let lines: Vec<String> = from_dynamic(&val);
//!     println!("{lines:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lifecycle;
pub mod marshal;
pub mod pack;
mod registry;
pub mod runtime_context;
pub mod sandbox;

pub use error::RuntimeError;
pub use lifecycle::{InitStatus, ModuleFactory, ScriptHost};
pub use marshal::{FromDynamic, ToDynamic, from_dynamic, to_dynamic};
pub use pack::{ModulePack, PACK_ENV, PackManifest, SUPPORTED_PACK_VERSION};
