//! Apply layered resource annotations to a load balancer's configuration.
//!
//! Annotations are set at three scopes: on a service, on the routing rule that
//! points at it, and globally. Every cycle, the caller diffs each scope
//! against the previous cycle to produce [AnnotationSource]s, bundles the
//! scopes for one rule into [Scopes], and then:
//!
//! - calls [configure_backend] to update the rule's [Backend][lbconf_api::Backend],
//! - resolves [ServerAnnotations] once per service and calls [configure_server]
//!   on every member of the pool,
//! - calls [handle_ssl_passthrough] to switch the rule between HTTP and SSL
//!   passthrough.
//!
//! Each of these returns `true` when it changed something, so callers know
//! whether the proxy needs a reload. Invalid annotation values never fail a
//! cycle. They're logged with [tracing] and skipped.

mod annotations;
pub use annotations::{resolve, AnnotationSource, AnnotationValue, Reach, Scopes};

mod keys;
pub use keys::Key;

mod cookie;
pub use cookie::resolve_cookie;

mod backend;
pub use backend::configure_backend;

mod server;
pub use server::{configure_server, resolve_server_annotations, ServerAnnotations, SERVER_KEYS};

mod passthrough;
pub use passthrough::handle_ssl_passthrough;

#[cfg(feature = "kube")]
mod kube;
#[cfg(feature = "kube")]
pub use crate::kube::ANNOTATION_PREFIX;

pub use lbconf_api::Status;
