//! Auth-domain identifiers, scope sets, cache keys, and cached token values.

pub mod id;
pub mod scope;
pub mod token;

pub use id::*;
pub use scope::*;
pub use token::{jwt::*, key::*, secret::*};
