//! Principal kinds, token signing/verification and password hashing.

pub mod codec;
pub mod kind;
pub mod password;
