//! cobbler: an autonomous GitHub issue-fixing agent.
//!
//! The crate is organized leaves-first:
//!
//! - [`vfs`] – an overlay/tombstone file system over a read-only remote base.
//! - [`github`] – the platform data model, API client, and a remote git
//!   porcelain (branch / commit / merge without a local clone).
//! - [`workspace`] – the three-stage discipline *local → validated →
//!   published* wrapping the VFS and the porcelain.
//! - [`llm`] – the model endpoint contract (content blocks, stop reasons),
//!   an Anthropic Messages client, and a scripted mock.
//! - [`conversation`] – persistent turn history with resume and
//!   summarization.
//! - [`tools`] – the tool registry the model drives, with the
//!   run/replay split for crash recovery.
//! - [`agent`] – the per-task resumable loop.
//! - [`task`] – issue search, task synthesis, and the attention gate.
//! - [`bot`] – the sequential task consumer and label management.

pub mod agent;
pub mod bot;
pub mod conversation;
pub mod github;
pub mod llm;
pub mod task;
pub mod tools;
pub mod validate;
pub mod vfs;
pub mod workspace;
