//! Capabilities that Salvo action handlers call out to.
//!
//! Provides the `ExecutionEnvironment` trait with a `LocalExecutionEnvironment`
//! implementation (files, directory listing, shell commands with a timeout),
//! an `HttpClient`, the `MailTransport` trait with an SMTP implementation, and
//! pure text / JSON / XML document edits.

pub mod documents;
pub mod environment;
pub mod http;
pub mod local_env;
pub mod mail;

pub use environment::{DirEntry, ExecResult, ExecutionEnvironment};
pub use http::{HttpClient, HttpResponse};
pub use local_env::LocalExecutionEnvironment;
pub use mail::{MailTransport, SmtpMailer};
