//! Load balancer configuration objects.
//!
//! These types describe the fragment of a proxy's configuration that is
//! driven by resource annotations: [Backend] pools, their [Server] members,
//! and [Cookie]-based persistence, along with the [RoutingPath]s that point at
//! them.
//!
//! Every configurable field has an `update_*` method that takes the raw
//! annotation string. Updates either apply completely or return an [Error]
//! and leave the object untouched.
//!
//! Use the `lbconf-core` crate to apply annotations from a set of scopes.

mod error;
pub use error::{Error, ErrorContext, ErrorKind};

mod backend;
pub use backend::{Backend, Balance, Httpchk, Mode};

mod cookie;
pub use cookie::{Cookie, CookieType};

mod route;
pub use route::RoutingPath;

mod server;
pub use server::Server;

mod shared;
pub use shared::{parse_bool, Duration, Status};
