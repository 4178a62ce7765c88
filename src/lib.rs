//! # hostkit - Remote Execution and File Transfer over SSH
//!
//! `hostkit` runs commands on remote hosts over SSH, streams their output line
//! by line, answers interactive prompts on a pty, and moves single files with
//! the legacy scp wire protocol. Hosts can be driven one at a time, fanned out
//! as a group, or reached through a jump host.
//!
//! ## Features
//!
//! - **Lazy Connections**: A host dials on first use and reuses its transport
//! - **Streamed Output**: stdout and stderr lines reach a [`formatter::Formatter`] as they arrive
//! - **Prompt Automation**: Regex-triggered responses for password and confirmation prompts
//! - **scp Transfers**: Upload from any reader, download into any writer, with SHA-256 reports
//! - **Group Fan-out**: One task per host, every result collected, no fail-fast
//! - **Proxy Chaining**: Tunnel a fresh SSH session through an already connected host
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hostkit::session::{Credentials, HostGroup, RemoteHost};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = RemoteHost::new("192.168.1.10", 22, "deploy", Credentials::password("secret"))?;
//!
//!     host.execute("uname -a").await?;
//!     host.put("hello\n", "/tmp/hello.txt").await?;
//!     assert_eq!(host.get("/tmp/hello.txt").await?, "hello\n");
//!
//!     host.execute_interactively("sudo -k true", [("(?i)password", "secret")])
//!         .await?;
//!
//!     let group = HostGroup::new([
//!         RemoteHost::new("10.0.0.1", 22, "deploy", Credentials::key_file("/home/deploy/.ssh/id_ed25519"))?,
//!         RemoteHost::new("10.0.0.2", 22, "deploy", Credentials::key_file("/home/deploy/.ssh/id_ed25519"))?,
//!     ]);
//!     let results = group.execute("systemctl is-active nginx").await;
//!     for failed in results.failures() {
//!         eprintln!("{} failed", failed.label);
//!     }
//!
//!     group.close_all().await;
//!     host.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::RemoteHost`] - One host: connection, execution, transfers, proxying
//! - [`session::HostGroup`] - Concurrent fan-out over several hosts
//! - [`prompt::PromptResponder`] - Ordered prompt patterns and their responses
//! - [`transfer`] - The scp source and sink roles over plain byte streams
//! - [`error::RemoteError`] - Error types for connections, commands and transfers
//! - [`config`] - SSH algorithm profiles and protocol constants

pub mod config;
pub mod error;
pub mod formatter;
pub mod prompt;
pub mod session;
pub mod transfer;
