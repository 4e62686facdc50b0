//! Pipeline stages for resolving image and upload references.
//!
//! Each submodule implements one step. The stages meet at small traits
//! ([`staging::Fetcher`], [`transform::Transformer`], [`upload::Uploader`],
//! [`store::RecordStore`]) so the orchestrator can be driven by fakes in
//! tests.
//!
//! ## Data Flow
//!
//! ```text
//! directive ──▶ form ──▶ store ──hit──▶ rendered ref
//!                          │
//!                         miss
//!                          ▼
//!              staging ──▶ transform ──▶ upload ──▶ store
//!              (fetch)     (rotate,      (host)     (record)
//!                           scale)
//! ```
//!
//! 1. [`form`]      — name the transform chain (`rot90-scale0.25`) and its record key
//! 2. [`store`]     — look records up in the document and/or the INI side file
//! 3. [`staging`]   — fetch the source into the local cache directory
//! 4. [`transform`] — rotate then scale; every step writes a derived file
//! 5. [`upload`]    — send the file to the host and record its location
//!
//! [`orchestrator`] drives the steps for one reference; [`ini`] is the side
//! file format used by [`store`].

pub mod form;
pub mod ini;
pub mod orchestrator;
pub mod staging;
pub mod store;
pub mod transform;
pub mod upload;
