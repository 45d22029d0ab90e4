//! Device abstraction for Nilan CTS602 heat-recovery ventilation controllers
//! reached over Modbus TCP or RTU-over-TCP.
//!
//! The crate turns raw 16-bit register banks into typed domain values and
//! works out, from the discovered hardware identity and bus version, which
//! logical attributes the connected unit actually supports:
//!
//! - [`registers`] holds the register catalog and the value codec,
//! - [`capabilities`] the declarative capability rules and their resolver,
//! - [`device`] the discovery handshake and typed read/write session,
//! - [`modbus`] and [`connection`] the wire framing and the transport seam.

pub mod capabilities;
pub mod connection;
pub mod device;
pub mod modbus;
pub mod registers;

pub use capabilities::{ResolvedCapabilities, TargetCategory};
pub use connection::{ConnectionConfig, Framing, TcpConnection, Transport};
pub use device::{DeviceIdentity, DeviceSession, SessionConfig, SessionState, Variant};
pub use registers::{Attribute, Bank, DataType, Mode, RegisterDescriptor, Value, VersionStyle};
