//! Access control for account logins: failed-login throttling, host-mask
//! allow lists, client certificates and password validation.

pub mod certs;
pub mod hostmask;
pub mod password;
pub mod throttle;

pub use certs::{ClientCertStore, DisabledCertStore, PemCertStore, open_store};
pub use hostmask::HostAllowList;
pub use throttle::{BadLoginThrottle, DECAY_INTERVAL};
