//! # Description
//! - this module is the accelerator side of the host
//! - session owns the live binding between the host and a programmed device
//! - read session.rs for more details
//!
//! # Components
//! - session: programs a device once, holds the buffer handles and the bound
//!   kernel arguments, moves bytes and invokes the kernel
//! - software: the software stand-in device, the nearest centroid oracle
//!   used when no hardware is attached
//!

pub mod session;
pub mod software;

pub use session::{BufferHandle, Device, Session};
