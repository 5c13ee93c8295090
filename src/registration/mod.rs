//! User-registration payloads: the request and reply shapes exchanged with
//! the storage service, a random user generator, the load workload built on
//! it, and a simulated service for offline runs.
mod reply;
mod responder;
mod user;
mod workload;

pub use reply::{RegistrationReply, STATUS_ERROR, STATUS_SUCCESS};
pub use responder::{KNOWN_FRIEND_DNIS, RegistrationResponder};
pub use user::{UserRegistration, generate_random_user, generate_user};
pub use workload::RegistrationWorkload;
